//! Bound State
//!
//! Everything a draw reads that was set by an earlier call: program,
//! textures per unit, vertex buffers and layouts per slot, fixed-function
//! state, viewport and scissor. The context owns one [`BindingState`] and
//! hands it to the draw path explicitly.

use crate::hal::{ScissorRect, Viewport};
use crate::pipeline::PipelineState;
use crate::resources::{ProgramHandle, TextureHandle, VertexBufferHandle};
use crate::vertex::BoundVertexLayout;

pub const MAX_TEXTURE_UNITS: usize = 32;
pub const MAX_VERTEX_BUFFERS: usize = 4;

#[derive(Clone, Debug)]
pub struct BindingState {
    pub program: Option<ProgramHandle>,
    pub textures: [Option<TextureHandle>; MAX_TEXTURE_UNITS],
    pub vertex_buffers: [Option<VertexBufferHandle>; MAX_VERTEX_BUFFERS],
    /// Declarations resolved against the program they were enabled for.
    pub vertex_layouts: [Option<BoundVertexLayout>; MAX_VERTEX_BUFFERS],
    pub pipeline_state: PipelineState,
    pub viewport: Viewport,
    pub viewport_changed: bool,
    pub scissor: ScissorRect,
    pub scissor_changed: bool,
    pub scissor_enabled: bool,
}

impl BindingState {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            program: None,
            textures: [None; MAX_TEXTURE_UNITS],
            vertex_buffers: [None; MAX_VERTEX_BUFFERS],
            vertex_layouts: [const { None }; MAX_VERTEX_BUFFERS],
            pipeline_state: PipelineState::default(),
            viewport: Viewport {
                x: 0.0,
                y: 0.0,
                width: width as f32,
                height: height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            },
            viewport_changed: true,
            scissor: full_rect(width, height),
            scissor_changed: true,
            scissor_enabled: false,
        }
    }

    pub fn set_viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.viewport = Viewport {
            x: x as f32,
            y: y as f32,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        self.viewport_changed = true;
    }

    pub fn set_scissor(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.scissor = ScissorRect {
            left: x,
            top: y,
            right: x + width as i32,
            bottom: y + height as i32,
        };
        self.scissor_changed = true;
    }

    pub fn set_scissor_enabled(&mut self, enabled: bool) {
        if self.scissor_enabled != enabled {
            self.scissor_enabled = enabled;
            self.scissor_changed = true;
        }
    }

    /// Rect to apply: the scissor when enabled, else the whole viewport.
    #[must_use]
    pub fn effective_scissor(&self) -> ScissorRect {
        if self.scissor_enabled {
            self.scissor
        } else {
            ScissorRect {
                left: self.viewport.x as i32,
                top: self.viewport.y as i32,
                right: (self.viewport.x + self.viewport.width) as i32,
                bottom: (self.viewport.y + self.viewport.height) as i32,
            }
        }
    }

    /// Drops every reference to `texture`.
    pub fn unbind_texture(&mut self, texture: TextureHandle) {
        for unit in &mut self.textures {
            if *unit == Some(texture) {
                *unit = None;
            }
        }
    }

    pub fn unbind_vertex_buffer(&mut self, buffer: VertexBufferHandle) {
        for slot in &mut self.vertex_buffers {
            if *slot == Some(buffer) {
                *slot = None;
            }
        }
    }
}

fn full_rect(width: u32, height: u32) -> ScissorRect {
    ScissorRect {
        left: 0,
        top: 0,
        right: width as i32,
        bottom: height as i32,
    }
}

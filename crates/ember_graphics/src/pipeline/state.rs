//! Render-state bitfield.
//!
//! [`PipelineState`] is a small `Copy` value holding every fixed-function
//! input that affects pipeline identity. It is hashed whole into the
//! pipeline cache key, so any field change selects a different pipeline.

use crate::hal::{BlendDesc, DepthStencilDesc, RasterizerDesc};
use crate::types::{ColorMask, FaceType, State};

/// Stencil test configuration for one face.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StencilFace {
    pub func: wgpu::CompareFunction,
    pub fail_op: wgpu::StencilOperation,
    pub depth_fail_op: wgpu::StencilOperation,
    pub pass_op: wgpu::StencilOperation,
}

impl Default for StencilFace {
    fn default() -> Self {
        Self {
            func: wgpu::CompareFunction::Always,
            fail_op: wgpu::StencilOperation::Keep,
            depth_fail_op: wgpu::StencilOperation::Keep,
            pass_op: wgpu::StencilOperation::Keep,
        }
    }
}

impl StencilFace {
    fn face_state(self) -> wgpu::StencilFaceState {
        wgpu::StencilFaceState {
            compare: self.func,
            fail_op: self.fail_op,
            depth_fail_op: self.depth_fail_op,
            pass_op: self.pass_op,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineState {
    pub write_color_mask: ColorMask,
    pub write_depth: bool,
    pub depth_test_enabled: bool,
    pub depth_test_func: wgpu::CompareFunction,
    pub blend_enabled: bool,
    pub blend_src_factor: wgpu::BlendFactor,
    pub blend_dst_factor: wgpu::BlendFactor,
    pub stencil_enabled: bool,
    pub stencil_front: StencilFace,
    pub stencil_back: StencilFace,
    pub stencil_reference: u8,
    pub stencil_compare_mask: u8,
    pub stencil_write_mask: u8,
    pub cull_face_enabled: bool,
    pub cull_face_type: FaceType,
    pub face_winding: wgpu::FrontFace,
    pub polygon_offset_fill_enabled: bool,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            write_color_mask: ColorMask::all(),
            write_depth: true,
            depth_test_enabled: true,
            depth_test_func: wgpu::CompareFunction::LessEqual,
            blend_enabled: false,
            blend_src_factor: wgpu::BlendFactor::One,
            blend_dst_factor: wgpu::BlendFactor::Zero,
            stencil_enabled: false,
            stencil_front: StencilFace::default(),
            stencil_back: StencilFace::default(),
            stencil_reference: 0,
            stencil_compare_mask: 0xff,
            stencil_write_mask: 0xff,
            cull_face_enabled: false,
            cull_face_type: FaceType::Back,
            face_winding: wgpu::FrontFace::Ccw,
            polygon_offset_fill_enabled: false,
        }
    }
}

impl PipelineState {
    /// Applies an enable/disable toggle. Returns `false` for states that are
    /// not part of the pipeline (scissor test is handled at draw time).
    pub fn set_state(&mut self, state: State, enabled: bool) -> bool {
        match state {
            State::DepthTest => self.depth_test_enabled = enabled,
            State::StencilTest => self.stencil_enabled = enabled,
            State::Blend => self.blend_enabled = enabled,
            State::CullFace => self.cull_face_enabled = enabled,
            State::PolygonOffsetFill => self.polygon_offset_fill_enabled = enabled,
            State::ScissorTest => return false,
        }
        true
    }

    pub fn set_stencil_func(
        &mut self,
        face: FaceType,
        func: wgpu::CompareFunction,
        reference: u8,
        mask: u8,
    ) {
        for stencil in self.stencil_faces(face) {
            stencil.func = func;
        }
        self.stencil_reference = reference;
        self.stencil_compare_mask = mask;
    }

    pub fn set_stencil_op(
        &mut self,
        face: FaceType,
        fail: wgpu::StencilOperation,
        depth_fail: wgpu::StencilOperation,
        pass: wgpu::StencilOperation,
    ) {
        for stencil in self.stencil_faces(face) {
            stencil.fail_op = fail;
            stencil.depth_fail_op = depth_fail;
            stencil.pass_op = pass;
        }
    }

    fn stencil_faces(&mut self, face: FaceType) -> impl Iterator<Item = &mut StencilFace> {
        let (front, back) = match face {
            FaceType::Front => (true, false),
            FaceType::Back => (false, true),
            FaceType::FrontAndBack => (true, true),
        };
        [
            front.then_some(&mut self.stencil_front),
            back.then_some(&mut self.stencil_back),
        ]
        .into_iter()
        .flatten()
    }

    // ── Translation ──────────────────────────────────────────────────────────

    #[must_use]
    pub fn rasterizer_desc(&self) -> RasterizerDesc {
        let cull_mode = if self.cull_face_enabled {
            match self.cull_face_type {
                FaceType::Front => Some(wgpu::Face::Front),
                FaceType::Back => Some(wgpu::Face::Back),
                FaceType::FrontAndBack => {
                    log::warn!("Culling both faces is not expressible; culling back faces");
                    Some(wgpu::Face::Back)
                }
            }
        } else {
            None
        };
        RasterizerDesc {
            cull_mode,
            front_face: self.face_winding,
            depth_bias_enabled: self.polygon_offset_fill_enabled,
        }
    }

    #[must_use]
    pub fn blend_desc(&self) -> BlendDesc {
        let blend = self.blend_enabled.then(|| {
            let component = wgpu::BlendComponent {
                src_factor: self.blend_src_factor,
                dst_factor: self.blend_dst_factor,
                operation: wgpu::BlendOperation::Add,
            };
            wgpu::BlendState {
                color: component,
                alpha: component,
            }
        });
        BlendDesc {
            blend,
            write_mask: self.write_color_mask.color_writes(),
        }
    }

    #[must_use]
    pub fn depth_stencil_desc(&self) -> DepthStencilDesc {
        DepthStencilDesc {
            depth_test_enabled: self.depth_test_enabled,
            depth_write_enabled: self.write_depth,
            depth_compare: self.depth_test_func,
            stencil_enabled: self.stencil_enabled,
            stencil_read_mask: self.stencil_compare_mask,
            stencil_write_mask: self.stencil_write_mask,
            front: self.stencil_front.face_state(),
            back: self.stencil_back.face_state(),
        }
    }
}

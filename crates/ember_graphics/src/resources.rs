//! Resource Arena
//!
//! Every object the context hands out lives in a generation-checked
//! [`SlotMap`]. Each handle type is a distinct key type, so a texture handle
//! cannot address a vertex buffer, and a deleted slot's generation bump makes
//! stale handles fail lookup instead of aliasing a newer object.

use slotmap::{SlotMap, new_key_type};

use crate::device_buffer::DeviceBuffer;
use crate::error::{GraphicsError, Result};
use crate::program::Program;
use crate::shader::ShaderModule;
use crate::texture::Texture;
use crate::vertex::VertexDeclaration;

new_key_type! {
    pub struct VertexBufferHandle;
    pub struct IndexBufferHandle;
    pub struct TextureHandle;
    pub struct ShaderModuleHandle;
    pub struct ProgramHandle;
    pub struct VertexDeclarationHandle;
}

#[derive(Default)]
pub(crate) struct ResourceArena {
    pub vertex_buffers: SlotMap<VertexBufferHandle, DeviceBuffer>,
    pub index_buffers: SlotMap<IndexBufferHandle, DeviceBuffer>,
    pub textures: SlotMap<TextureHandle, Texture>,
    pub shader_modules: SlotMap<ShaderModuleHandle, ShaderModule>,
    pub programs: SlotMap<ProgramHandle, Program>,
    pub vertex_declarations: SlotMap<VertexDeclarationHandle, VertexDeclaration>,
}

/// Lookup that turns a missing slot into [`GraphicsError::InvalidHandle`].
pub(crate) trait ArenaLookup<K, V> {
    fn lookup(&self, key: K, what: &'static str) -> Result<&V>;
    fn lookup_mut(&mut self, key: K, what: &'static str) -> Result<&mut V>;
}

impl<K: slotmap::Key, V> ArenaLookup<K, V> for SlotMap<K, V> {
    fn lookup(&self, key: K, what: &'static str) -> Result<&V> {
        self.get(key).ok_or(GraphicsError::InvalidHandle(what))
    }

    fn lookup_mut(&mut self, key: K, what: &'static str) -> Result<&mut V> {
        self.get_mut(key).ok_or(GraphicsError::InvalidHandle(what))
    }
}

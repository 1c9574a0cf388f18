//! Named Constants
//!
//! [`NamedConstantBuffer`] stores `Vec4` runs keyed by [`NameHash`] in one
//! contiguous backing vector. Every live entry owns the half-open range
//! `start..start + len`; ranges never overlap and together cover the whole
//! vector. Removing or growing an entry moves the values after it and
//! shifts the recorded starts of the entries that follow.
//!
//! ```text
//!   values: [ tint | tint | uv_scale | light | light | light ]
//!   tint      start 0 len 2
//!   uv_scale  start 2 len 1
//!   light     start 3 len 3
//! ```

use ember_core::NameHash;
use ember_graphics::hal::Device;
use ember_graphics::{Context, UniformLocation};
use glam::{Mat4, Vec4};
use rustc_hash::FxHashMap;

use crate::error::{ConstantError, Result};

/// How a constant's values are produced and interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConstantType {
    /// Values set by the user, applied as `vec4`s.
    #[default]
    User,
    ViewProj,
    World,
    Texture,
    View,
    Projection,
    Normal,
    WorldView,
    WorldViewProj,
    /// Values set by the user, applied as `mat4`s (four values each).
    UserMatrix4,
}

// ─── Constant ────────────────────────────────────────────────────────────────

/// A standalone constant: name, values, resolved location and type.
#[derive(Clone, Debug)]
pub struct Constant {
    name_hash: NameHash,
    values: Vec<Vec4>,
    location: UniformLocation,
    ty: ConstantType,
}

impl Constant {
    #[must_use]
    pub fn new(name_hash: NameHash) -> Self {
        Self {
            name_hash,
            values: Vec::new(),
            location: UniformLocation::INVALID,
            ty: ConstantType::User,
        }
    }

    #[inline]
    #[must_use]
    pub fn name_hash(&self) -> NameHash {
        self.name_hash
    }

    pub fn set_name_hash(&mut self, name_hash: NameHash) {
        self.name_hash = name_hash;
    }

    #[inline]
    #[must_use]
    pub fn values(&self) -> &[Vec4] {
        &self.values
    }

    /// Replaces the values.
    pub fn set_values(&mut self, values: &[Vec4]) -> Result<()> {
        if values.len() > self.values.capacity() {
            self.values
                .try_reserve_exact(values.len() - self.values.len())
                .map_err(|_| ConstantError::OutOfResources(values.len()))?;
        }
        self.values.clear();
        self.values.extend_from_slice(values);
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn location(&self) -> UniformLocation {
        self.location
    }

    pub fn set_location(&mut self, location: UniformLocation) {
        self.location = location;
    }

    #[inline]
    #[must_use]
    pub fn constant_type(&self) -> ConstantType {
        self.ty
    }

    pub fn set_constant_type(&mut self, ty: ConstantType) {
        self.ty = ty;
    }
}

// ─── Named Constant Buffer ───────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ConstantRun {
    start: usize,
    len: usize,
    ty: ConstantType,
}

/// Borrowed view of one entry. Invalidated by any mutation of the buffer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConstantView<'a> {
    pub values: &'a [Vec4],
    pub ty: ConstantType,
}

#[derive(Clone, Debug, Default)]
pub struct NamedConstantBuffer {
    constants: FxHashMap<NameHash, ConstantRun>,
    values: Vec<Vec4>,
}

impl NamedConstantBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of named entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.constants.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    /// Total number of `Vec4`s across all entries.
    #[inline]
    #[must_use]
    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    pub fn clear(&mut self) {
        self.constants.clear();
        self.values.clear();
    }

    /// Sets `name` to exactly `values`.
    ///
    /// A different element count replaces the entry with a fresh run at the
    /// end. Same count with a different type is rejected and nothing is
    /// written.
    pub fn set(&mut self, name: NameHash, values: &[Vec4], ty: ConstantType) -> Result<()> {
        if let Some(run) = self.constants.get(&name).copied() {
            if run.len == values.len() {
                if run.ty != ty {
                    return Err(ConstantError::TypeMismatch {
                        name,
                        existing: run.ty,
                        requested: ty,
                    });
                }
                self.values[run.start..run.start + run.len].copy_from_slice(values);
                return Ok(());
            }
            self.remove(name);
        }
        let start = self.append(name, values.len(), ty)?;
        self.values[start..start + values.len()].copy_from_slice(values);
        Ok(())
    }

    /// Writes `values` at `offset` within `name`'s run, growing the run with
    /// zeros when it is too short. A missing entry is created with
    /// `offset + values.len()` values.
    pub fn set_at_index(&mut self, name: NameHash, values: &[Vec4], offset: usize, ty: ConstantType) -> Result<()> {
        let required = offset + values.len();
        let start = match self.constants.get_mut(&name) {
            None => self.append(name, required, ty)?,
            Some(run) if run.len > 0 && run.ty != ty => {
                return Err(ConstantError::TypeMismatch {
                    name,
                    existing: run.ty,
                    requested: ty,
                });
            }
            Some(run) if run.len < required => {
                let grow = required - run.len;
                self.values
                    .try_reserve(grow)
                    .map_err(|_| ConstantError::OutOfResources(grow))?;
                let end = run.start + run.len;
                self.values.splice(end..end, std::iter::repeat_n(Vec4::ZERO, grow));
                run.len = required;
                let start = run.start;
                // Runs at the old end, including one sharing an empty run's start.
                for (key, other) in &mut self.constants {
                    if *key != name && other.start >= end {
                        other.start += grow;
                    }
                }
                start
            }
            Some(run) => run.start,
        };
        self.values[start + offset..start + required].copy_from_slice(values);
        Ok(())
    }

    /// Sets every constant in `constants` by name.
    pub fn set_many(&mut self, constants: &[Constant]) -> Result<()> {
        for constant in constants {
            self.set(constant.name_hash, &constant.values, constant.ty)?;
        }
        Ok(())
    }

    /// Deletes `name`, compacting the values after it. Returns whether the
    /// entry existed.
    pub fn remove(&mut self, name: NameHash) -> bool {
        let Some(run) = self.constants.remove(&name) else {
            return false;
        };
        self.values.drain(run.start..run.start + run.len);
        for other in self.constants.values_mut() {
            if other.start > run.start {
                other.start -= run.len;
            }
        }
        true
    }

    #[must_use]
    pub fn get(&self, name: NameHash) -> Option<ConstantView<'_>> {
        self.constants.get(&name).map(|run| self.view(*run))
    }

    /// Every entry, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (NameHash, ConstantView<'_>)> + '_ {
        self.constants.iter().map(|(name, run)| (*name, self.view(*run)))
    }

    /// Writes every entry the bound program declares into its uniform
    /// data. Entries the program does not use are skipped.
    pub fn apply<D: Device>(&self, ctx: &mut Context<D>) -> Result<()> {
        let program = ctx
            .bound_program()
            .ok_or(ember_graphics::GraphicsError::NoProgramBound)?;
        for (name, view) in self.iter() {
            let location = ctx.get_uniform_location_by_hash(program, name)?;
            if !location.is_valid() {
                continue;
            }
            if view.ty == ConstantType::UserMatrix4 {
                if view.values.len() % 4 != 0 {
                    log::warn!("Matrix constant {name:?} has {} values; trailing values ignored", view.values.len());
                }
                let matrices: Vec<Mat4> = view
                    .values
                    .chunks_exact(4)
                    .map(|cols| Mat4::from_cols(cols[0], cols[1], cols[2], cols[3]))
                    .collect();
                ctx.set_constant_m4(location, &matrices)?;
            } else {
                ctx.set_constant_v4(location, view.values)?;
            }
        }
        Ok(())
    }

    fn view(&self, run: ConstantRun) -> ConstantView<'_> {
        ConstantView {
            values: &self.values[run.start..run.start + run.len],
            ty: run.ty,
        }
    }

    fn append(&mut self, name: NameHash, len: usize, ty: ConstantType) -> Result<usize> {
        self.values
            .try_reserve(len)
            .map_err(|_| ConstantError::OutOfResources(len))?;
        self.constants
            .try_reserve(1)
            .map_err(|_| ConstantError::OutOfResources(1))?;
        let start = self.values.len();
        self.values.resize(start + len, Vec4::ZERO);
        self.constants.insert(name, ConstantRun { start, len, ty });
        Ok(start)
    }
}

//! Particle record layout.
//!
//! One [`ParticleState`] record per slot lives in the shared buffer. The same
//! bytes are read-write storage for the compute kernels and a vertex stream
//! for the renderer, so both sides must agree on stride and field offsets.
//! [`PARTICLE_SCHEMA`] is the single declaration of that layout:
//!
//! - the compute program gets its `Particle` struct from [`RecordSchema::to_wgsl`],
//! - the render pipeline gets its vertex attributes from
//!   [`RecordSchema::vertex_attributes`],
//! - `const` assertions below pin the Rust struct to the schema, and
//!   [`RecordSchema::validate`] checks at startup that WGSL layout rules
//!   produce exactly the declared offsets.

use std::mem::{offset_of, size_of};

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::error::SetupError;

/// Bytes per particle record.
pub const PARTICLE_STRIDE: u32 = 64;

/// One particle slot, as stored on the GPU.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ParticleState {
    pub position: [f32; 3],
    /// Simulation time at which the slot was last spawned.
    pub spawn_time: f32,
    /// 1 while alive, 0 otherwise. Read by the vertex stage.
    pub alive: u32,
    /// Seconds the particle lives after `spawn_time`.
    pub lifetime: f32,
    /// Per-particle random stream, fixed at spawn.
    pub seed: u32,
    pub _pad0: u32,
    pub velocity: [f32; 3],
    pub _pad1: f32,
    pub acceleration: [f32; 3],
    pub _pad2: f32,
}

impl ParticleState {
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.alive != 0
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    #[inline]
    pub fn velocity(&self) -> Vec3 {
        Vec3::from_array(self.velocity)
    }
}

/// Scalar and vector types a record field may have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    F32,
    U32,
    Vec3F32,
}

impl FieldType {
    /// WGSL spelling of the type.
    pub const fn wgsl(self) -> &'static str {
        match self {
            FieldType::F32 => "f32",
            FieldType::U32 => "u32",
            FieldType::Vec3F32 => "vec3<f32>",
        }
    }

    /// Size in bytes under WGSL host-shareable layout rules.
    pub const fn size(self) -> u32 {
        match self {
            FieldType::F32 | FieldType::U32 => 4,
            FieldType::Vec3F32 => 12,
        }
    }

    /// Alignment in bytes under WGSL host-shareable layout rules.
    pub const fn align(self) -> u32 {
        match self {
            FieldType::F32 | FieldType::U32 => 4,
            FieldType::Vec3F32 => 16,
        }
    }

    pub fn vertex_format(self) -> wgpu::VertexFormat {
        match self {
            FieldType::F32 => wgpu::VertexFormat::Float32,
            FieldType::U32 => wgpu::VertexFormat::Uint32,
            FieldType::Vec3F32 => wgpu::VertexFormat::Float32x3,
        }
    }
}

/// A named field at a fixed byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub ty: FieldType,
    pub offset: u32,
}

impl Field {
    const fn new(name: &'static str, ty: FieldType, offset: u32) -> Self {
        Self { name, ty, offset }
    }
}

/// Ordered field list describing one record.
#[derive(Debug, Clone, Copy)]
pub struct RecordSchema {
    /// WGSL struct name.
    pub name: &'static str,
    pub stride: u32,
    pub fields: &'static [Field],
}

/// Layout of [`ParticleState`].
pub const PARTICLE_SCHEMA: RecordSchema = RecordSchema {
    name: "Particle",
    stride: PARTICLE_STRIDE,
    fields: &[
        Field::new("position", FieldType::Vec3F32, 0),
        Field::new("spawn_time", FieldType::F32, 12),
        Field::new("alive", FieldType::U32, 16),
        Field::new("lifetime", FieldType::F32, 20),
        Field::new("seed", FieldType::U32, 24),
        Field::new("_pad0", FieldType::U32, 28),
        Field::new("velocity", FieldType::Vec3F32, 32),
        Field::new("_pad1", FieldType::F32, 44),
        Field::new("acceleration", FieldType::Vec3F32, 48),
        Field::new("_pad2", FieldType::F32, 60),
    ],
};

const _: () = {
    assert!(size_of::<ParticleState>() == PARTICLE_STRIDE as usize);
    assert!(offset_of!(ParticleState, position) == 0);
    assert!(offset_of!(ParticleState, spawn_time) == 12);
    assert!(offset_of!(ParticleState, alive) == 16);
    assert!(offset_of!(ParticleState, lifetime) == 20);
    assert!(offset_of!(ParticleState, seed) == 24);
    assert!(offset_of!(ParticleState, velocity) == 32);
    assert!(offset_of!(ParticleState, acceleration) == 48);
};

impl RecordSchema {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check that WGSL layout rules place every field at its declared offset
    /// and that the struct size equals the stride.
    pub fn validate(&self) -> Result<(), SetupError> {
        let mut cursor = 0u32;
        let mut struct_align = 1u32;

        for field in self.fields {
            let expected = round_up(cursor, field.ty.align());
            if field.offset != expected {
                return Err(SetupError::Schema(format!(
                    "{}.{} declared at offset {}, WGSL places it at {}",
                    self.name, field.name, field.offset, expected
                )));
            }
            cursor = field.offset + field.ty.size();
            struct_align = struct_align.max(field.ty.align());
        }

        let size = round_up(cursor, struct_align);
        if size != self.stride {
            return Err(SetupError::Schema(format!(
                "{} stride is {} but WGSL struct size is {}",
                self.name, self.stride, size
            )));
        }

        match self.field("position") {
            Some(f) if f.offset == 0 && f.ty == FieldType::Vec3F32 => {}
            _ => {
                return Err(SetupError::Schema(format!(
                    "{} must start with `position: vec3<f32>`",
                    self.name
                )))
            }
        }
        if self.field("alive").map(|f| f.ty) != Some(FieldType::U32) {
            return Err(SetupError::Schema(format!(
                "{} needs an `alive: u32` field",
                self.name
            )));
        }

        Ok(())
    }

    /// WGSL struct declaration for this record.
    pub fn to_wgsl(&self) -> String {
        let mut code = format!("struct {} {{\n", self.name);
        for field in self.fields {
            code.push_str(&format!("    {}: {},\n", field.name, field.ty.wgsl()));
        }
        code.push_str("}\n");
        code
    }

    /// Vertex attributes for the named fields, at the given shader locations.
    pub fn vertex_attributes(
        &self,
        bindings: &[(&str, u32)],
    ) -> Result<Vec<wgpu::VertexAttribute>, SetupError> {
        bindings
            .iter()
            .map(|&(name, location)| {
                let field = self.field(name).ok_or_else(|| {
                    SetupError::Schema(format!("{} has no field `{}`", self.name, name))
                })?;
                Ok(wgpu::VertexAttribute {
                    offset: field.offset as wgpu::BufferAddress,
                    shader_location: location,
                    format: field.ty.vertex_format(),
                })
            })
            .collect()
    }
}

const fn round_up(value: u32, align: u32) -> u32 {
    value.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_particle_schema_is_valid() {
        PARTICLE_SCHEMA.validate().expect("particle schema should validate");
    }

    #[test]
    fn test_wgsl_struct_lists_every_field_in_order() {
        let wgsl = PARTICLE_SCHEMA.to_wgsl();
        assert!(wgsl.starts_with("struct Particle {"));

        let mut last = 0;
        for field in PARTICLE_SCHEMA.fields {
            let decl = format!("{}: {},", field.name, field.ty.wgsl());
            let at = wgsl.find(&decl).unwrap_or_else(|| panic!("missing {decl}"));
            assert!(at >= last, "{} out of order", field.name);
            last = at;
        }
    }

    #[test]
    fn test_vertex_attributes_follow_schema() {
        let attrs = PARTICLE_SCHEMA
            .vertex_attributes(&[("position", 0), ("alive", 1)])
            .unwrap();
        assert_eq!(attrs[0].offset, 0);
        assert_eq!(attrs[0].format, wgpu::VertexFormat::Float32x3);
        assert_eq!(attrs[1].offset, 16);
        assert_eq!(attrs[1].format, wgpu::VertexFormat::Uint32);
        assert_eq!(attrs[1].shader_location, 1);
    }

    #[test]
    fn test_unknown_vertex_field_is_an_error() {
        assert!(PARTICLE_SCHEMA.vertex_attributes(&[("colour", 2)]).is_err());
    }

    #[test]
    fn test_misaligned_vec3_is_rejected() {
        const FIELDS: &[Field] = &[
            Field::new("position", FieldType::Vec3F32, 0),
            Field::new("alive", FieldType::U32, 12),
            Field::new("velocity", FieldType::Vec3F32, 16),
            Field::new("spin", FieldType::Vec3F32, 28),
        ];
        let broken = RecordSchema {
            name: "Broken",
            stride: 32,
            fields: FIELDS,
        };
        let err = broken.validate().unwrap_err().to_string();
        assert!(err.contains("spin"), "{err}");
    }

    #[test]
    fn test_wrong_stride_is_rejected() {
        const FIELDS: &[Field] = &[
            Field::new("position", FieldType::Vec3F32, 0),
            Field::new("alive", FieldType::U32, 12),
        ];
        let broken = RecordSchema {
            name: "Short",
            stride: 64,
            fields: FIELDS,
        };
        assert!(broken.validate().is_err());
    }

    #[test]
    fn test_zeroed_record_is_dead() {
        let p = ParticleState::zeroed();
        assert!(!p.is_alive());
        assert_eq!(p.position(), Vec3::ZERO);
    }
}

//! Shared particle buffer and its ownership protocol.
//!
//! The particle buffer is one allocation used by two domains: the compute
//! kernels read and write it as storage, the renderer reads it as a vertex
//! stream. At any moment exactly one domain owns it.
//!
//! ```text
//!            acquire()                    release() / drop
//!  Render ─────────────────▶ Compute ─────────────────────▶ Render
//!   │ as_render_source()      │ dispatch(), as_compute_target()
//! ```
//!
//! Ownership is enforced by the borrow checker rather than at runtime:
//! [`SharedBuffer::acquire`] mutably borrows the buffer for as long as the
//! returned [`ComputeAccess`] guard lives, so render access and a second
//! acquire cannot be expressed while compute owns it. Dropping the guard
//! without calling [`ComputeAccess::release`] still releases.
//!
//! A [`SharedBuffer`] can only be created with an [`InteropCapability`],
//! which only [`InteropCapability::negotiate`] hands out.

use crate::compute::KernelArgs;
use crate::error::{DispatchError, SetupError};

/// A compute backend that can run the particle kernels on shared memory.
pub trait ComputeDomain {
    /// Buffer handle the kernels operate on.
    type Memory;

    /// Allocate `capacity` records of `stride` bytes, usable by both domains.
    fn allocate(&mut self, capacity: u32, stride: u32) -> Result<Self::Memory, SetupError>;

    /// Fix `memory` as the buffer every stage operates on. Called once.
    fn bind(&mut self, memory: &Self::Memory) -> Result<(), SetupError>;

    /// Wait until rendering no longer uses `memory`, then open a dispatch batch.
    fn acquire(&mut self, memory: &mut Self::Memory) -> Result<(), DispatchError>;

    /// Enqueue one stage over every slot.
    fn dispatch(&mut self, memory: &mut Self::Memory, args: &KernelArgs) -> Result<(), DispatchError>;

    /// Finish the batch and block until all its work has completed.
    fn release(&mut self, memory: &mut Self::Memory) -> Result<(), DispatchError>;
}

/// Limits a domain reports during negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainLimits {
    pub compute_shaders: bool,
    pub max_buffer_size: u64,
    pub max_storage_buffer_binding_size: u64,
    pub max_vertex_buffer_array_stride: u32,
    pub max_compute_workgroups_per_dimension: u32,
    pub max_compute_invocations_per_workgroup: u32,
}

/// Proof that compute and render can share a buffer of a given size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InteropCapability {
    capacity: u32,
    stride: u32,
}

impl InteropCapability {
    /// Check that a buffer of `capacity` records of `stride` bytes fits both
    /// domains' limits.
    pub fn negotiate(limits: &DomainLimits, capacity: u32, stride: u32) -> Result<Self, SetupError> {
        let fail = |reason: String| Err(SetupError::Interop { reason });

        if !limits.compute_shaders {
            return fail("device does not support compute shaders".into());
        }
        if capacity == 0 || stride == 0 {
            return fail(format!("cannot share an empty buffer ({capacity} x {stride} bytes)"));
        }

        let bytes = capacity as u64 * stride as u64;
        if bytes > limits.max_buffer_size {
            return fail(format!(
                "{capacity} particles need {bytes} bytes, device buffers are limited to {}",
                limits.max_buffer_size
            ));
        }
        if bytes > limits.max_storage_buffer_binding_size {
            return fail(format!(
                "{capacity} particles need {bytes} bytes, storage bindings are limited to {}",
                limits.max_storage_buffer_binding_size
            ));
        }
        if stride > limits.max_vertex_buffer_array_stride {
            return fail(format!(
                "record stride {stride} exceeds vertex stride limit {}",
                limits.max_vertex_buffer_array_stride
            ));
        }
        if crate::compute::WORKGROUP_SIZE > limits.max_compute_invocations_per_workgroup {
            return fail(format!(
                "workgroup size {} exceeds device limit {}",
                crate::compute::WORKGROUP_SIZE,
                limits.max_compute_invocations_per_workgroup
            ));
        }
        let groups = crate::compute::workgroup_count(capacity);
        if groups > limits.max_compute_workgroups_per_dimension {
            return fail(format!(
                "{capacity} particles need {groups} workgroups, device allows {}",
                limits.max_compute_workgroups_per_dimension
            ));
        }

        Ok(Self { capacity, stride })
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }
}

/// Which domain currently owns a [`SharedBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    Render,
    Compute,
}

/// The particle buffer, shared between compute and render.
#[derive(Debug)]
pub struct SharedBuffer<M> {
    memory: M,
    capacity: u32,
    stride: u32,
    owner: Owner,
    cycles: u64,
}

impl<M> SharedBuffer<M> {
    /// Allocate the buffer in `domain` and bind it to every stage.
    ///
    /// The buffer starts out owned by render.
    pub fn create<D>(domain: &mut D, capability: &InteropCapability) -> Result<Self, SetupError>
    where
        D: ComputeDomain<Memory = M>,
    {
        let memory = domain.allocate(capability.capacity, capability.stride)?;
        domain.bind(&memory)?;
        tracing::info!(
            "allocated shared particle buffer: {} records x {} bytes",
            capability.capacity,
            capability.stride
        );
        Ok(Self {
            memory,
            capacity: capability.capacity,
            stride: capability.stride,
            owner: Owner::Render,
            cycles: 0,
        })
    }

    /// Hand the buffer to compute until the returned guard is released.
    pub fn acquire<'a, D>(&'a mut self, domain: &'a mut D) -> Result<ComputeAccess<'a, D>, DispatchError>
    where
        D: ComputeDomain<Memory = M>,
    {
        debug_assert_eq!(self.owner, Owner::Render);
        domain.acquire(&mut self.memory)?;
        self.owner = Owner::Compute;
        Ok(ComputeAccess {
            buffer: self,
            domain,
            released: false,
        })
    }

    /// Read-only view for drawing.
    pub fn as_render_source(&self) -> RenderSource<'_, M> {
        RenderSource {
            memory: &self.memory,
            capacity: self.capacity,
            stride: self.stride,
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn size_bytes(&self) -> u64 {
        self.capacity as u64 * self.stride as u64
    }

    pub fn owner(&self) -> Owner {
        self.owner
    }

    /// Completed acquire/release cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    fn finish_cycle(&mut self) {
        self.owner = Owner::Render;
        self.cycles += 1;
    }
}

/// Render-side view of a [`SharedBuffer`].
#[derive(Debug)]
pub struct RenderSource<'a, M> {
    memory: &'a M,
    capacity: u32,
    stride: u32,
}

impl<'a, M> RenderSource<'a, M> {
    pub fn memory(&self) -> &'a M {
        self.memory
    }

    /// Number of records, i.e. instances to draw.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }
}

impl<M> Clone for RenderSource<'_, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for RenderSource<'_, M> {}

/// Compute ownership of a [`SharedBuffer`].
///
/// Call [`release`](Self::release) to hand the buffer back and observe
/// errors. If the guard is dropped instead, it releases anyway and logs any
/// error.
pub struct ComputeAccess<'a, D: ComputeDomain> {
    buffer: &'a mut SharedBuffer<D::Memory>,
    domain: &'a mut D,
    released: bool,
}

impl<'a, D: ComputeDomain> ComputeAccess<'a, D> {
    pub fn dispatch(&mut self, args: &KernelArgs) -> Result<(), DispatchError> {
        self.domain.dispatch(&mut self.buffer.memory, args)
    }

    /// The buffer as compute sees it.
    pub fn as_compute_target(&mut self) -> &mut D::Memory {
        &mut self.buffer.memory
    }

    pub fn capacity(&self) -> u32 {
        self.buffer.capacity
    }

    /// Block until all dispatched work completes and hand the buffer back to render.
    pub fn release(mut self) -> Result<(), DispatchError> {
        self.released = true;
        self.buffer.finish_cycle();
        self.domain.release(&mut self.buffer.memory)
    }
}

impl<D: ComputeDomain> Drop for ComputeAccess<'_, D> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.buffer.finish_cycle();
        if let Err(e) = self.domain.release(&mut self.buffer.memory) {
            tracing::error!("implicit release of shared buffer failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        log: Vec<&'static str>,
        fail_release: bool,
    }

    impl ComputeDomain for Recorder {
        type Memory = Vec<u8>;

        fn allocate(&mut self, capacity: u32, stride: u32) -> Result<Vec<u8>, SetupError> {
            self.log.push("allocate");
            Ok(vec![0; (capacity * stride) as usize])
        }

        fn bind(&mut self, _memory: &Vec<u8>) -> Result<(), SetupError> {
            self.log.push("bind");
            Ok(())
        }

        fn acquire(&mut self, _memory: &mut Vec<u8>) -> Result<(), DispatchError> {
            self.log.push("acquire");
            Ok(())
        }

        fn dispatch(&mut self, memory: &mut Vec<u8>, _args: &KernelArgs) -> Result<(), DispatchError> {
            self.log.push("dispatch");
            memory[0] += 1;
            Ok(())
        }

        fn release(&mut self, _memory: &mut Vec<u8>) -> Result<(), DispatchError> {
            self.log.push("release");
            if self.fail_release {
                return Err(DispatchError::Sync("device lost".into()));
            }
            Ok(())
        }
    }

    fn limits() -> DomainLimits {
        DomainLimits {
            compute_shaders: true,
            max_buffer_size: 1 << 30,
            max_storage_buffer_binding_size: 128 << 20,
            max_vertex_buffer_array_stride: 2048,
            max_compute_workgroups_per_dimension: 65535,
            max_compute_invocations_per_workgroup: 256,
        }
    }

    #[test]
    fn test_negotiate_accepts_default_capacity() {
        let cap = InteropCapability::negotiate(&limits(), 1_000_000, 64).unwrap();
        assert_eq!(cap.capacity(), 1_000_000);
    }

    #[test]
    fn test_negotiate_rejects_missing_compute() {
        let limits = DomainLimits {
            compute_shaders: false,
            ..limits()
        };
        let err = InteropCapability::negotiate(&limits, 16, 64).unwrap_err();
        assert!(matches!(err, SetupError::Interop { .. }));
    }

    #[test]
    fn test_negotiate_rejects_oversized_buffer() {
        let err = InteropCapability::negotiate(&limits(), 10_000_000, 64).unwrap_err();
        assert!(err.to_string().contains("storage bindings"), "{err}");
    }

    #[test]
    fn test_negotiate_rejects_zero_capacity() {
        assert!(InteropCapability::negotiate(&limits(), 0, 64).is_err());
    }

    #[test]
    fn test_create_allocates_then_binds() {
        let mut domain = Recorder::default();
        let cap = InteropCapability::negotiate(&limits(), 4, 64).unwrap();
        let buffer = SharedBuffer::create(&mut domain, &cap).unwrap();

        assert_eq!(domain.log, ["allocate", "bind"]);
        assert_eq!(buffer.owner(), Owner::Render);
        assert_eq!(buffer.size_bytes(), 256);
        assert_eq!(buffer.as_render_source().memory().len(), 256);
    }

    #[test]
    fn test_acquire_dispatch_release_cycle() {
        let mut domain = Recorder::default();
        let cap = InteropCapability::negotiate(&limits(), 4, 64).unwrap();
        let mut buffer = SharedBuffer::create(&mut domain, &cap).unwrap();
        domain.log.clear();

        let mut access = buffer.acquire(&mut domain).unwrap();
        access.dispatch(&KernelArgs::Initialize).unwrap();
        access.dispatch(&KernelArgs::DeathCheck { now: 1.0 }).unwrap();
        assert_eq!(access.as_compute_target()[0], 2);
        access.release().unwrap();

        assert_eq!(domain.log, ["acquire", "dispatch", "dispatch", "release"]);
        assert_eq!(buffer.owner(), Owner::Render);
        assert_eq!(buffer.cycles(), 1);
    }

    #[test]
    fn test_dropped_guard_releases() {
        let mut domain = Recorder::default();
        let cap = InteropCapability::negotiate(&limits(), 4, 64).unwrap();
        let mut buffer = SharedBuffer::create(&mut domain, &cap).unwrap();
        domain.log.clear();

        {
            let mut access = buffer.acquire(&mut domain).unwrap();
            access.dispatch(&KernelArgs::Initialize).unwrap();
        }

        assert_eq!(domain.log, ["acquire", "dispatch", "release"]);
        assert_eq!(buffer.owner(), Owner::Render);
    }

    #[test]
    fn test_release_error_is_reported_and_ownership_returns() {
        let mut domain = Recorder {
            fail_release: true,
            ..Recorder::default()
        };
        let cap = InteropCapability::negotiate(&limits(), 4, 64).unwrap();
        let mut buffer = SharedBuffer::create(&mut domain, &cap).unwrap();

        let access = buffer.acquire(&mut domain).unwrap();
        let err = access.release().unwrap_err();
        assert!(matches!(err, DispatchError::Sync(_)));
        assert_eq!(buffer.owner(), Owner::Render);
    }
}

//! Descriptor set layouts, fixed-capacity pools and batched writes.
//!
//! - [`DescriptorSetLayout`] is built from declared bindings and keeps them for validation
//! - [`DescriptorPool`] is sized once at build time and never grows
//! - [`DescriptorWriter`] binds buffers and images to an allocated set
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use dither_rhi::descriptor::{DescriptorPool, DescriptorSetLayout, DescriptorWriter};
//! use dither_rhi::device::Device;
//! use dither_rhi::vk;
//!
//! # fn example(device: Arc<Device>, ubo: vk::DescriptorBufferInfo) -> dither_rhi::RhiResult<()> {
//! let layout = DescriptorSetLayout::builder()
//!     .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::ALL_GRAPHICS, 1)
//!     .build(device.clone())?;
//!
//! let mut pool = DescriptorPool::builder()
//!     .max_sets(2)
//!     .pool_size(vk::DescriptorType::UNIFORM_BUFFER, 2)
//!     .build(device)?;
//!
//! let set = DescriptorWriter::new(&layout)
//!     .write_buffer(0, ubo)
//!     .build(&mut pool)?;
//! # let _ = set;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, trace};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Default upper bound on sets per pool.
pub const DEFAULT_MAX_SETS: u32 = 1000;

/// One declared binding of a set layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutBinding {
    pub binding: u32,
    pub kind: vk::DescriptorType,
    pub stages: vk::ShaderStageFlags,
    pub count: u32,
}

impl LayoutBinding {
    fn to_vk(self) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(self.binding)
            .descriptor_type(self.kind)
            .descriptor_count(self.count)
            .stage_flags(self.stages)
    }
}

// =============================================================================
// Layouts
// =============================================================================

/// Declarative builder for [`DescriptorSetLayout`].
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<LayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    /// Declare a binding.
    ///
    /// # Panics
    ///
    /// Panics if `binding` was already declared.
    pub fn add_binding(
        mut self,
        binding: u32,
        kind: vk::DescriptorType,
        stages: vk::ShaderStageFlags,
        count: u32,
    ) -> Self {
        assert!(
            self.bindings.iter().all(|b| b.binding != binding),
            "descriptor binding {binding} declared twice"
        );
        assert!(count > 0, "descriptor binding {binding} has a zero count");
        self.bindings.push(LayoutBinding {
            binding,
            kind,
            stages,
            count,
        });
        self
    }

    pub fn bindings(&self) -> &[LayoutBinding] {
        &self.bindings
    }

    pub fn build(self, device: Arc<Device>) -> RhiResult<DescriptorSetLayout> {
        let vk_bindings: Vec<_> = self.bindings.iter().map(|b| b.to_vk()).collect();
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings);
        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!(
            "Created descriptor set layout with {} binding(s)",
            self.bindings.len()
        );

        Ok(DescriptorSetLayout {
            device,
            layout,
            bindings: self.bindings,
        })
    }
}

/// Descriptor set layout and the bindings it was declared with.
///
/// Immutable after creation; share it through `Arc` when several systems use it.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
    bindings: Vec<LayoutBinding>,
}

impl DescriptorSetLayout {
    pub fn builder() -> DescriptorSetLayoutBuilder {
        DescriptorSetLayoutBuilder::default()
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    #[inline]
    pub fn bindings(&self) -> &[LayoutBinding] {
        &self.bindings
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Descriptors of each kind one set of `bindings` consumes.
pub fn descriptor_demand(bindings: &[LayoutBinding]) -> Vec<(vk::DescriptorType, u32)> {
    let mut demand: Vec<(vk::DescriptorType, u32)> = Vec::new();
    for binding in bindings {
        match demand.iter_mut().find(|(kind, _)| *kind == binding.kind) {
            Some((_, count)) => *count += binding.count,
            None => demand.push((binding.kind, binding.count)),
        }
    }
    demand
}

// =============================================================================
// Pools
// =============================================================================

/// Host-side record of what a pool can still hand out.
///
/// Vulkan drivers are allowed to satisfy allocations beyond the declared pool
/// sizes, so capacity is enforced here to make exhaustion deterministic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolBudget {
    max_sets: u32,
    sets_remaining: u32,
    capacity: Vec<(vk::DescriptorType, u32)>,
    remaining: Vec<(vk::DescriptorType, u32)>,
}

impl PoolBudget {
    pub fn new(max_sets: u32, sizes: &[(vk::DescriptorType, u32)]) -> Self {
        let mut capacity: Vec<(vk::DescriptorType, u32)> = Vec::new();
        for &(kind, count) in sizes {
            match capacity.iter_mut().find(|(k, _)| *k == kind) {
                Some((_, total)) => *total += count,
                None => capacity.push((kind, count)),
            }
        }
        Self {
            max_sets,
            sets_remaining: max_sets,
            remaining: capacity.clone(),
            capacity,
        }
    }

    /// Take one set and `demand` descriptors, or nothing at all.
    pub fn try_reserve(&mut self, demand: &[(vk::DescriptorType, u32)]) -> RhiResult<()> {
        if self.sets_remaining == 0 {
            return Err(RhiError::SetsExhausted {
                max_sets: self.max_sets,
            });
        }
        for &(kind, requested) in demand {
            let remaining = self.remaining(kind);
            if requested > remaining {
                return Err(RhiError::PoolExhausted {
                    kind,
                    requested,
                    remaining,
                });
            }
        }

        self.sets_remaining -= 1;
        for &(kind, requested) in demand {
            if let Some((_, left)) = self.remaining.iter_mut().find(|(k, _)| *k == kind) {
                *left -= requested;
            }
        }
        Ok(())
    }

    /// Give back one set and its descriptors.
    pub fn release(&mut self, demand: &[(vk::DescriptorType, u32)]) {
        self.sets_remaining = (self.sets_remaining + 1).min(self.max_sets);
        for &(kind, count) in demand {
            let cap = self.capacity(kind);
            if let Some((_, left)) = self.remaining.iter_mut().find(|(k, _)| *k == kind) {
                *left = (*left + count).min(cap);
            }
        }
    }

    pub fn reset(&mut self) {
        self.sets_remaining = self.max_sets;
        self.remaining = self.capacity.clone();
    }

    pub fn remaining(&self, kind: vk::DescriptorType) -> u32 {
        lookup(&self.remaining, kind)
    }

    pub fn capacity(&self, kind: vk::DescriptorType) -> u32 {
        lookup(&self.capacity, kind)
    }

    pub fn sets_remaining(&self) -> u32 {
        self.sets_remaining
    }

    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
}

fn lookup(table: &[(vk::DescriptorType, u32)], kind: vk::DescriptorType) -> u32 {
    table
        .iter()
        .find(|(k, _)| *k == kind)
        .map_or(0, |&(_, count)| count)
}

pub struct DescriptorPoolBuilder {
    max_sets: u32,
    sizes: Vec<(vk::DescriptorType, u32)>,
    flags: vk::DescriptorPoolCreateFlags,
}

impl Default for DescriptorPoolBuilder {
    fn default() -> Self {
        Self {
            max_sets: DEFAULT_MAX_SETS,
            sizes: Vec::new(),
            flags: vk::DescriptorPoolCreateFlags::empty(),
        }
    }
}

impl DescriptorPoolBuilder {
    /// Number of sets the pool can hand out before it is exhausted.
    pub fn max_sets(mut self, max_sets: u32) -> Self {
        self.max_sets = max_sets;
        self
    }

    /// Reserve `count` descriptors of `kind`. Repeated kinds add up.
    pub fn pool_size(mut self, kind: vk::DescriptorType, count: u32) -> Self {
        self.sizes.push((kind, count));
        self
    }

    /// Creation flags. `FREE_DESCRIPTOR_SET` is needed for [`DescriptorPool::free`].
    pub fn flags(mut self, flags: vk::DescriptorPoolCreateFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Create the pool with the declared capacity.
    ///
    /// # Errors
    ///
    /// Returns an error if `vkCreateDescriptorPool` fails.
    pub fn build(self, device: Arc<Device>) -> RhiResult<DescriptorPool> {
        let budget = PoolBudget::new(self.max_sets, &self.sizes);
        let pool_sizes: Vec<vk::DescriptorPoolSize> = budget
            .capacity
            .iter()
            .map(|&(kind, count)| {
                vk::DescriptorPoolSize::default()
                    .ty(kind)
                    .descriptor_count(count)
            })
            .collect();

        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(self.max_sets)
            .pool_sizes(&pool_sizes)
            .flags(self.flags);
        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };

        debug!(
            "Created descriptor pool: max_sets={}, sizes={:?}",
            self.max_sets, budget.capacity
        );

        Ok(DescriptorPool {
            device,
            pool,
            budget,
            flags: self.flags,
        })
    }
}

/// Fixed-capacity descriptor pool.
///
/// Not thread-safe; the owner serializes access through `&mut self`.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
    budget: PoolBudget,
    flags: vk::DescriptorPoolCreateFlags,
}

impl DescriptorPool {
    pub fn builder() -> DescriptorPoolBuilder {
        DescriptorPoolBuilder::default()
    }

    /// Allocate one set with `layout`.
    ///
    /// Fails with [`RhiError::SetsExhausted`] or [`RhiError::PoolExhausted`]
    /// once the declared capacity is used up.
    pub fn allocate(&mut self, layout: &DescriptorSetLayout) -> RhiResult<vk::DescriptorSet> {
        self.allocate_raw(layout.handle(), layout.bindings())
    }

    fn allocate_raw(
        &mut self,
        layout: vk::DescriptorSetLayout,
        bindings: &[LayoutBinding],
    ) -> RhiResult<vk::DescriptorSet> {
        let demand = descriptor_demand(bindings);
        self.budget.try_reserve(&demand)?;

        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);
        match unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info) } {
            Ok(sets) => {
                trace!(
                    "Allocated descriptor set, {} set(s) left",
                    self.budget.sets_remaining()
                );
                Ok(sets[0])
            }
            Err(e) => {
                self.budget.release(&demand);
                Err(e.into())
            }
        }
    }

    /// Return sets allocated with `layout` to the pool.
    ///
    /// Requires `FREE_DESCRIPTOR_SET`. The sets must not be in use by the GPU.
    pub fn free(&mut self, sets: &[vk::DescriptorSet], layout: &DescriptorSetLayout) -> RhiResult<()> {
        if !self
            .flags
            .contains(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
        {
            return Err(RhiError::InvalidResource(
                "descriptor pool was not created with FREE_DESCRIPTOR_SET".into(),
            ));
        }
        if sets.is_empty() {
            return Ok(());
        }

        unsafe { self.device.handle().free_descriptor_sets(self.pool, sets)? };
        let demand = descriptor_demand(layout.bindings());
        for _ in sets {
            self.budget.release(&demand);
        }
        Ok(())
    }

    /// Return every set to the pool. None of them may be in use by the GPU.
    pub fn reset(&mut self) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .reset_descriptor_pool(self.pool, vk::DescriptorPoolResetFlags::empty())?;
        }
        self.budget.reset();
        debug!("Reset descriptor pool");
        Ok(())
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    #[inline]
    pub fn budget(&self) -> &PoolBudget {
        &self.budget
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
    }
}

// =============================================================================
// Writes
// =============================================================================

enum Resources {
    Buffers(Vec<vk::DescriptorBufferInfo>),
    Images(Vec<vk::DescriptorImageInfo>),
}

struct PendingWrite {
    binding: u32,
    kind: vk::DescriptorType,
    resources: Resources,
}

/// Collects resource writes for one set and applies them in a single update.
pub struct DescriptorWriter<'a> {
    layout: vk::DescriptorSetLayout,
    bindings: &'a [LayoutBinding],
    writes: Vec<PendingWrite>,
}

impl<'a> DescriptorWriter<'a> {
    pub fn new(layout: &'a DescriptorSetLayout) -> Self {
        Self::from_bindings(layout.handle(), layout.bindings())
    }

    pub fn from_bindings(layout: vk::DescriptorSetLayout, bindings: &'a [LayoutBinding]) -> Self {
        Self {
            layout,
            bindings,
            writes: Vec::new(),
        }
    }

    /// # Panics
    ///
    /// Panics if the layout has no buffer binding at `binding`.
    pub fn write_buffer(mut self, binding: u32, info: vk::DescriptorBufferInfo) -> Self {
        let declared = self.declared(binding, 1);
        assert!(
            is_buffer_kind(declared.kind),
            "binding {binding} is {:?}, not a buffer binding",
            declared.kind
        );
        self.push(binding, declared.kind, Resources::Buffers(vec![info]));
        self
    }

    /// # Panics
    ///
    /// Panics if the layout has no image binding at `binding`.
    pub fn write_image(self, binding: u32, info: vk::DescriptorImageInfo) -> Self {
        self.write_images(binding, &[info])
    }

    /// Write an array of images starting at element 0.
    ///
    /// # Panics
    ///
    /// Panics if the binding is missing, is not an image binding, is declared
    /// with a single descriptor while `infos` has several, or is shorter than `infos`.
    pub fn write_images(mut self, binding: u32, infos: &[vk::DescriptorImageInfo]) -> Self {
        assert!(!infos.is_empty(), "empty image write for binding {binding}");
        let declared = self.declared(binding, infos.len());
        assert!(
            !is_buffer_kind(declared.kind),
            "binding {binding} is {:?}, not an image binding",
            declared.kind
        );
        self.push(binding, declared.kind, Resources::Images(infos.to_vec()));
        self
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Allocate a set from `pool` and write every pending resource into it.
    pub fn build(self, pool: &mut DescriptorPool) -> RhiResult<vk::DescriptorSet> {
        let set = pool.allocate_raw(self.layout, self.bindings)?;
        self.overwrite(&pool.device, set);
        Ok(set)
    }

    /// Write the pending resources into an existing set.
    ///
    /// The set must not be in use by the GPU.
    pub fn overwrite(&self, device: &Device, set: vk::DescriptorSet) {
        if self.writes.is_empty() {
            return;
        }

        let writes: Vec<vk::WriteDescriptorSet> = self
            .writes
            .iter()
            .map(|write| {
                let base = vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(write.binding)
                    .dst_array_element(0)
                    .descriptor_type(write.kind);
                match &write.resources {
                    Resources::Buffers(infos) => base.buffer_info(infos),
                    Resources::Images(infos) => base.image_info(infos),
                }
            })
            .collect();

        unsafe { device.handle().update_descriptor_sets(&writes, &[]) };
        trace!("Wrote {} binding(s)", writes.len());
    }

    fn declared(&self, binding: u32, len: usize) -> LayoutBinding {
        let declared = self
            .bindings
            .iter()
            .find(|b| b.binding == binding)
            .copied();
        let Some(declared) = declared else {
            panic!("layout does not contain binding {binding}");
        };
        assert!(
            len <= 1 || declared.count > 1,
            "binding {binding} holds a single descriptor but {len} were written"
        );
        assert!(
            len as u32 <= declared.count,
            "binding {binding} holds {} descriptor(s) but {len} were written",
            declared.count
        );
        declared
    }

    fn push(&mut self, binding: u32, kind: vk::DescriptorType, resources: Resources) {
        self.writes.retain(|w| w.binding != binding);
        self.writes.push(PendingWrite {
            binding,
            kind,
            resources,
        });
    }
}

fn is_buffer_kind(kind: vk::DescriptorType) -> bool {
    matches!(
        kind,
        vk::DescriptorType::UNIFORM_BUFFER
            | vk::DescriptorType::STORAGE_BUFFER
            | vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
            | vk::DescriptorType::STORAGE_BUFFER_DYNAMIC
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const UBO: vk::DescriptorType = vk::DescriptorType::UNIFORM_BUFFER;
    const SAMPLER: vk::DescriptorType = vk::DescriptorType::COMBINED_IMAGE_SAMPLER;

    fn global_bindings() -> Vec<LayoutBinding> {
        DescriptorSetLayout::builder()
            .add_binding(0, UBO, vk::ShaderStageFlags::ALL_GRAPHICS, 1)
            .add_binding(1, SAMPLER, vk::ShaderStageFlags::FRAGMENT, 1)
            .bindings()
            .to_vec()
    }

    fn material_bindings() -> Vec<LayoutBinding> {
        DescriptorSetLayout::builder()
            .add_binding(0, SAMPLER, vk::ShaderStageFlags::FRAGMENT, 4)
            .bindings()
            .to_vec()
    }

    #[test]
    fn test_builder_keeps_declaration_order() {
        let bindings = global_bindings();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].binding, 0);
        assert_eq!(bindings[0].kind, UBO);
        assert_eq!(bindings[1].stages, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    #[should_panic(expected = "declared twice")]
    fn test_duplicate_binding_panics() {
        let _ = DescriptorSetLayout::builder()
            .add_binding(0, UBO, vk::ShaderStageFlags::VERTEX, 1)
            .add_binding(0, SAMPLER, vk::ShaderStageFlags::FRAGMENT, 1);
    }

    #[test]
    fn test_demand_sums_per_kind() {
        let bindings = DescriptorSetLayout::builder()
            .add_binding(0, SAMPLER, vk::ShaderStageFlags::FRAGMENT, 1)
            .add_binding(1, UBO, vk::ShaderStageFlags::FRAGMENT, 1)
            .add_binding(2, SAMPLER, vk::ShaderStageFlags::FRAGMENT, 1)
            .bindings()
            .to_vec();
        let demand = descriptor_demand(&bindings);
        assert_eq!(demand, vec![(SAMPLER, 2), (UBO, 1)]);
    }

    #[test]
    fn test_pool_capacity_exhausts_after_c_allocations() {
        let capacity = 3;
        let demand = descriptor_demand(&global_bindings());
        let mut budget = PoolBudget::new(100, &[(UBO, capacity), (SAMPLER, capacity)]);

        for _ in 0..capacity {
            assert!(budget.try_reserve(&demand).is_ok());
        }
        match budget.try_reserve(&demand) {
            Err(RhiError::PoolExhausted {
                kind,
                requested,
                remaining,
            }) => {
                assert_eq!(kind, UBO);
                assert_eq!(requested, 1);
                assert_eq!(remaining, 0);
            }
            other => panic!("expected PoolExhausted, got {other:?}"),
        }
    }

    #[test]
    fn test_pool_set_limit() {
        let demand = descriptor_demand(&global_bindings());
        let mut budget = PoolBudget::new(2, &[(UBO, 10), (SAMPLER, 10)]);
        assert!(budget.try_reserve(&demand).is_ok());
        assert!(budget.try_reserve(&demand).is_ok());
        assert!(matches!(
            budget.try_reserve(&demand),
            Err(RhiError::SetsExhausted { max_sets: 2 })
        ));
    }

    #[test]
    fn test_failed_reservation_takes_nothing() {
        let demand = descriptor_demand(&global_bindings());
        let mut budget = PoolBudget::new(10, &[(UBO, 5)]);
        assert!(budget.try_reserve(&demand).is_err());
        assert_eq!(budget.remaining(UBO), 5);
        assert_eq!(budget.sets_remaining(), 10);
    }

    #[test]
    fn test_release_and_reset_restore_capacity() {
        let demand = descriptor_demand(&material_bindings());
        let mut budget = PoolBudget::new(2, &[(SAMPLER, 8)]);
        budget.try_reserve(&demand).unwrap();
        budget.try_reserve(&demand).unwrap();
        assert_eq!(budget.remaining(SAMPLER), 0);

        budget.release(&demand);
        assert_eq!(budget.remaining(SAMPLER), 4);
        assert_eq!(budget.sets_remaining(), 1);

        budget.reset();
        assert_eq!(budget.remaining(SAMPLER), 8);
        assert_eq!(budget.sets_remaining(), 2);
        budget.release(&demand);
        assert_eq!(budget.remaining(SAMPLER), 8);
    }

    #[test]
    fn test_pool_sizes_of_same_kind_merge() {
        let budget = PoolBudget::new(4, &[(UBO, 2), (UBO, 3)]);
        assert_eq!(budget.capacity(UBO), 5);
        assert_eq!(budget.capacity(SAMPLER), 0);
    }

    #[test]
    fn test_writer_collects_writes() {
        let bindings = global_bindings();
        let writer = DescriptorWriter::from_bindings(vk::DescriptorSetLayout::null(), &bindings)
            .write_buffer(0, vk::DescriptorBufferInfo::default())
            .write_image(1, vk::DescriptorImageInfo::default())
            .write_image(1, vk::DescriptorImageInfo::default());
        assert_eq!(writer.len(), 2);
    }

    #[test]
    fn test_writer_accepts_array_within_count() {
        let bindings = material_bindings();
        let infos = [vk::DescriptorImageInfo::default(); 4];
        let writer = DescriptorWriter::from_bindings(vk::DescriptorSetLayout::null(), &bindings)
            .write_images(0, &infos);
        assert!(!writer.is_empty());
    }

    #[test]
    #[should_panic(expected = "does not contain binding 7")]
    fn test_writer_missing_binding_panics() {
        let bindings = global_bindings();
        let _ = DescriptorWriter::from_bindings(vk::DescriptorSetLayout::null(), &bindings)
            .write_buffer(7, vk::DescriptorBufferInfo::default());
    }

    #[test]
    #[should_panic(expected = "single descriptor")]
    fn test_writer_array_into_single_binding_panics() {
        let bindings = global_bindings();
        let infos = [vk::DescriptorImageInfo::default(); 2];
        let _ = DescriptorWriter::from_bindings(vk::DescriptorSetLayout::null(), &bindings)
            .write_images(1, &infos);
    }

    #[test]
    #[should_panic(expected = "not a buffer binding")]
    fn test_writer_buffer_into_image_binding_panics() {
        let bindings = global_bindings();
        let _ = DescriptorWriter::from_bindings(vk::DescriptorSetLayout::null(), &bindings)
            .write_buffer(1, vk::DescriptorBufferInfo::default());
    }
}

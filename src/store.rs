//! Particle state on the device.
//!
//! Three equal-length `vec4<f32>` buffers (position, velocity, color) hold
//! one particle per index. The store owns them; the count only changes by
//! releasing everything and allocating again.

use glam::Vec4;
use rand::Rng;

use crate::driver::DEFAULT_WORKGROUP_SIZE;
use crate::error::{AllocationError, SimulationError};
use crate::gpu::{GpuDevice, ParticleBuffers};
use crate::sampler::UniformBallSampler;

/// Bytes per particle in each buffer.
pub const PARTICLE_STRIDE: u64 = std::mem::size_of::<Vec4>() as u64;

/// Initial speed relative to the unit ball the velocity is sampled from.
const INITIAL_SPEED: f32 = 0.1;

/// Owner of the particle buffers.
///
/// Every successful allocation bumps [`generation`](Self::generation), so
/// anything bound to the previous buffers can tell it is stale.
#[derive(Debug)]
pub struct ParticleStateStore<B> {
    buffers: Option<ParticleBuffers<B>>,
    count: u32,
    generation: u64,
    workgroup_size: u32,
}

impl<B> Default for ParticleStateStore<B> {
    fn default() -> Self {
        Self {
            buffers: None,
            count: 0,
            generation: 0,
            workgroup_size: DEFAULT_WORKGROUP_SIZE,
        }
    }
}

impl<B> ParticleStateStore<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Size allocations for an update kernel with this `@workgroup_size`.
    ///
    /// A count whose dispatch would exceed the device's workgroup limit is
    /// refused at allocation time.
    pub fn with_workgroup_size(mut self, workgroup_size: u32) -> Self {
        self.workgroup_size = workgroup_size.max(1);
        self
    }

    /// Allocate zeroed buffers for `count` particles, releasing any current ones.
    ///
    /// Either all three buffers are created or none are: a failure drops the
    /// ones already made and leaves the store unallocated.
    pub fn allocate<D>(&mut self, device: &mut D, count: u32) -> Result<(), AllocationError>
    where
        D: GpuDevice<Buffer = B>,
    {
        self.release();
        if count == 0 {
            return Err(AllocationError::ZeroParticles);
        }
        check_workgroups(device, count, self.workgroup_size)?;

        let size = u64::from(count) * PARTICLE_STRIDE;
        match create_buffers(device, size) {
            Ok(buffers) => {
                self.buffers = Some(buffers);
                self.count = count;
                self.generation += 1;
                log::info!(
                    "allocated {} particles ({} bytes per buffer)",
                    count,
                    size
                );
                Ok(())
            }
            Err(e) => {
                log::error!("particle allocation failed: {}", e);
                Err(e)
            }
        }
    }

    /// Write fresh initial state: positions uniformly inside the unit ball,
    /// small random velocities, opaque white.
    pub fn seed<D, R>(
        &mut self,
        device: &mut D,
        sampler: &UniformBallSampler,
        rng: &mut R,
    ) -> Result<(), SimulationError>
    where
        D: GpuDevice<Buffer = B>,
        R: Rng + ?Sized,
    {
        let buffers = self.buffers.as_ref().ok_or(SimulationError::Unallocated)?;
        write_initial_state(device, buffers, self.count, sampler, rng);
        Ok(())
    }

    /// Release, allocate `count` particles and seed them.
    ///
    /// Bindings made against the old buffers are stale afterwards.
    pub fn resize<D, R>(
        &mut self,
        device: &mut D,
        count: u32,
        sampler: &UniformBallSampler,
        rng: &mut R,
    ) -> Result<(), AllocationError>
    where
        D: GpuDevice<Buffer = B>,
        R: Rng + ?Sized,
    {
        log::info!("resizing particle store {} -> {}", self.count, count);
        self.allocate(device, count)?;
        if let Some(buffers) = &self.buffers {
            write_initial_state(device, buffers, self.count, sampler, rng);
        }
        Ok(())
    }

    /// Drop the buffers, freeing device memory.
    pub fn release(&mut self) {
        if self.buffers.take().is_some() {
            log::debug!("released {} particles", self.count);
        }
        self.count = 0;
    }

    pub fn is_allocated(&self) -> bool {
        self.buffers.is_some()
    }

    /// Number of particles, zero while unallocated.
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn workgroup_size(&self) -> u32 {
        self.workgroup_size
    }

    pub fn buffers(&self) -> Option<&ParticleBuffers<B>> {
        self.buffers.as_ref()
    }

    /// Copy positions back to the host. Blocks until the device is idle.
    pub fn read_positions<D>(&self, device: &mut D) -> Result<Vec<Vec4>, SimulationError>
    where
        D: GpuDevice<Buffer = B>,
    {
        self.read(device, |b| &b.position)
    }

    pub fn read_velocities<D>(&self, device: &mut D) -> Result<Vec<Vec4>, SimulationError>
    where
        D: GpuDevice<Buffer = B>,
    {
        self.read(device, |b| &b.velocity)
    }

    pub fn read_colors<D>(&self, device: &mut D) -> Result<Vec<Vec4>, SimulationError>
    where
        D: GpuDevice<Buffer = B>,
    {
        self.read(device, |b| &b.color)
    }

    fn read<D>(
        &self,
        device: &mut D,
        pick: impl Fn(&ParticleBuffers<B>) -> &B,
    ) -> Result<Vec<Vec4>, SimulationError>
    where
        D: GpuDevice<Buffer = B>,
    {
        let buffers = self.buffers.as_ref().ok_or(SimulationError::Unallocated)?;
        let bytes = device.read_buffer(pick(buffers))?;
        Ok(bytemuck::allocation::pod_collect_to_vec(&bytes))
    }
}

/// Workgroups needed to update `count` particles, if one dispatch can launch them.
pub fn check_workgroups<D: GpuDevice>(
    device: &D,
    count: u32,
    workgroup_size: u32,
) -> Result<u32, AllocationError> {
    let workgroups = count.div_ceil(workgroup_size.max(1));
    let limit = device.max_workgroups();
    if workgroups > limit {
        return Err(AllocationError::TooManyWorkgroups {
            particles: count,
            workgroups,
            limit,
        });
    }
    Ok(workgroups)
}

fn write_initial_state<D, R>(
    device: &mut D,
    buffers: &ParticleBuffers<D::Buffer>,
    count: u32,
    sampler: &UniformBallSampler,
    rng: &mut R,
) where
    D: GpuDevice,
    R: Rng + ?Sized,
{
    let count = count as usize;
    let mut positions = Vec::with_capacity(count);
    let mut velocities = Vec::with_capacity(count);
    for _ in 0..count {
        positions.push(sampler.sample(rng).extend(1.0));
        velocities.push((sampler.sample(rng) * INITIAL_SPEED).extend(0.0));
    }
    let colors = vec![Vec4::ONE; count];

    device.write_buffer(&buffers.position, bytemuck::cast_slice(&positions));
    device.write_buffer(&buffers.velocity, bytemuck::cast_slice(&velocities));
    device.write_buffer(&buffers.color, bytemuck::cast_slice(&colors));
    log::debug!("seeded {} particles", count);
}

/// `?` drops whatever was already created, so a failure leaks nothing.
fn create_buffers<D: GpuDevice>(
    device: &mut D,
    size: u64,
) -> Result<ParticleBuffers<D::Buffer>, AllocationError> {
    let position = device.create_buffer("Position Buffer", size)?;
    let velocity = device.create_buffer("Velocity Buffer", size)?;
    let color = device.create_buffer("Color Buffer", size)?;
    Ok(ParticleBuffers {
        position,
        velocity,
        color,
    })
}

/// Whether every position is finite and inside the unit ball.
pub fn positions_in_unit_ball(positions: &[Vec4]) -> bool {
    positions
        .iter()
        .all(|p| p.is_finite() && p.truncate().length() <= 1.0 + 1e-6)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{Op, RecordingDevice};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_zero_particles_rejected() {
        let mut device = RecordingDevice::new();
        let mut store = ParticleStateStore::new();
        assert_eq!(
            store.allocate(&mut device, 0),
            Err(AllocationError::ZeroParticles)
        );
        assert!(!store.is_allocated());
    }

    #[test]
    fn test_seed_requires_allocation() {
        let mut device = RecordingDevice::new();
        let mut store = ParticleStateStore::new();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            store.seed(&mut device, &UniformBallSampler, &mut rng),
            Err(SimulationError::Unallocated)
        ));
    }

    #[test]
    fn test_seed_contents() {
        let mut device = RecordingDevice::new();
        let mut store = ParticleStateStore::new();
        let mut rng = StdRng::seed_from_u64(7);
        store.allocate(&mut device, 256).unwrap();
        store.seed(&mut device, &UniformBallSampler, &mut rng).unwrap();

        let positions = store.read_positions(&mut device).unwrap();
        let velocities = store.read_velocities(&mut device).unwrap();
        let colors = store.read_colors(&mut device).unwrap();

        assert_eq!(positions.len(), 256);
        assert!(positions_in_unit_ball(&positions));
        assert!(positions.iter().all(|p| p.w == 1.0));
        assert!(velocities
            .iter()
            .all(|v| v.w == 0.0 && v.truncate().length() <= INITIAL_SPEED + 1e-6));
        assert!(colors.iter().all(|c| *c == Vec4::ONE));
    }

    #[test]
    fn test_partial_allocation_rolls_back() {
        // Room for two 4-particle buffers, not three.
        let mut device = RecordingDevice::new().with_memory_limit(2 * 4 * PARTICLE_STRIDE);
        let mut store = ParticleStateStore::new();

        let err = store.allocate(&mut device, 4).unwrap_err();
        assert!(matches!(err, AllocationError::OutOfMemory { .. }));
        assert!(!store.is_allocated());
        assert_eq!(device.live_buffers(), 0);

        let destroyed = device
            .ops()
            .iter()
            .filter(|op| matches!(op, Op::DestroyBuffer { .. }))
            .count();
        assert_eq!(destroyed, 2);
    }

    #[test]
    fn test_resize_frees_before_allocating() {
        // Only one allocation of this size fits at a time.
        let mut device = RecordingDevice::new().with_memory_limit(3 * 100 * PARTICLE_STRIDE);
        let mut store = ParticleStateStore::new();
        let mut rng = StdRng::seed_from_u64(3);

        store.resize(&mut device, 100, &UniformBallSampler, &mut rng).unwrap();
        let first = store.generation();
        store.resize(&mut device, 100, &UniformBallSampler, &mut rng).unwrap();

        assert_eq!(store.count(), 100);
        assert_eq!(store.generation(), first + 1);
        assert_eq!(device.live_buffers(), 3);
    }

    #[test]
    fn test_failed_resize_leaves_store_empty() {
        let mut device = RecordingDevice::new().with_memory_limit(3 * 10 * PARTICLE_STRIDE);
        let mut store = ParticleStateStore::new();
        let mut rng = StdRng::seed_from_u64(3);

        store.resize(&mut device, 10, &UniformBallSampler, &mut rng).unwrap();
        assert!(store.resize(&mut device, 11, &UniformBallSampler, &mut rng).is_err());

        assert!(!store.is_allocated());
        assert_eq!(store.count(), 0);
        assert_eq!(device.live_buffers(), 0);

        store.resize(&mut device, 10, &UniformBallSampler, &mut rng).unwrap();
        assert!(store.is_allocated());
    }

    #[test]
    fn test_count_beyond_dispatch_limit_rejected() {
        let mut device = RecordingDevice::new().with_max_workgroups(4);
        let mut store = ParticleStateStore::new().with_workgroup_size(64);
        let mut rng = StdRng::seed_from_u64(5);

        // 4 * 64 particles fit exactly; one more needs a fifth group.
        store.resize(&mut device, 256, &UniformBallSampler, &mut rng).unwrap();
        let err = store
            .resize(&mut device, 257, &UniformBallSampler, &mut rng)
            .unwrap_err();
        assert_eq!(
            err,
            AllocationError::TooManyWorkgroups {
                particles: 257,
                workgroups: 5,
                limit: 4
            }
        );
        assert!(!store.is_allocated());
        assert_eq!(device.live_buffers(), 0);

        store.resize(&mut device, 200, &UniformBallSampler, &mut rng).unwrap();
        assert_eq!(store.count(), 200);
    }

    #[test]
    fn test_default_limit_matches_wgpu() {
        let mut device = RecordingDevice::new();
        let mut store = ParticleStateStore::new().with_workgroup_size(64);

        // 65_535 groups of 64 is the most one dispatch can cover.
        let err = store.allocate(&mut device, 4_200_000).unwrap_err();
        assert!(matches!(
            err,
            AllocationError::TooManyWorkgroups { workgroups: 65_625, limit: 65_535, .. }
        ));
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn test_resize_seeds_new_buffers() {
        let mut device = RecordingDevice::new();
        let mut store = ParticleStateStore::new();
        let mut rng = StdRng::seed_from_u64(8);
        store.resize(&mut device, 32, &UniformBallSampler, &mut rng).unwrap();

        let positions = store.read_positions(&mut device).unwrap();
        assert!(positions_in_unit_ball(&positions));
        assert!(positions.iter().all(|p| p.w == 1.0));
        assert!(positions.iter().any(|p| p.truncate() != glam::Vec3::ZERO));
        assert!(store
            .read_colors(&mut device)
            .unwrap()
            .iter()
            .all(|c| *c == Vec4::ONE));
    }
}

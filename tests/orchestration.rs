//! End-to-end orchestration tests.
//!
//! Everything here runs against `RecordingDevice`, so no GPU is needed: the
//! tests check which commands reach the device, in what order, and what the
//! particle buffers hold.

use glam::Vec4;
use rand::rngs::StdRng;
use rand::SeedableRng;
use swarm::gpu::camera::FlyCamera;
use swarm::gpu::{GpuDevice, Op, RecordedBuffer, RecordingDevice};
use swarm::input::KeyCode;
use swarm::store::{positions_in_unit_ball, PARTICLE_STRIDE};
use swarm::time::ManualClock;
use swarm::{
    AllocationError, Command, FrameDriver, KernelSource, ParamUpdate, ParticleStateStore,
    RenderDriver, RunState, SimulationConfig, SimulationDriver, SimulationError,
    SimulationParameters, Tick, UniformBallSampler,
};

type Driver = FrameDriver<RecordingDevice, ManualClock, FlyCamera>;

fn frame_driver(config: SimulationConfig, device: RecordingDevice) -> (Driver, ManualClock) {
    let clock = ManualClock::new();
    let driver = FrameDriver::new(device, &config, clock.clone(), FlyCamera::default());
    (driver, clock)
}

fn seeded_store(
    device: &mut RecordingDevice,
    count: u32,
) -> ParticleStateStore<RecordedBuffer> {
    let mut store = ParticleStateStore::new();
    let mut rng = StdRng::seed_from_u64(99);
    store
        .resize(device, count, &UniformBallSampler, &mut rng)
        .unwrap();
    store
}

fn update_driver(
    device: &mut RecordingDevice,
    store: &ParticleStateStore<RecordedBuffer>,
) -> SimulationDriver<RecordingDevice> {
    let mut driver = SimulationDriver::new(device, &KernelSource::update(256), 256);
    driver.bind(device, store).unwrap();
    driver
}

fn count_ops(ops: &[Op], pred: impl Fn(&Op) -> bool) -> usize {
    ops.iter().filter(|op| pred(op)).count()
}

// ============================================================================
// Seeding
// ============================================================================

#[test]
fn test_seeded_positions_inside_unit_ball() {
    for count in [1, 7, 1000, 4096] {
        let mut device = RecordingDevice::new();
        let store = seeded_store(&mut device, count);
        let positions = store.read_positions(&mut device).unwrap();
        assert_eq!(positions.len(), count as usize);
        assert!(positions_in_unit_ball(&positions), "count {}", count);
    }
}

#[test]
fn test_four_particles_seed_then_draw() {
    let mut device = RecordingDevice::new();
    let store = seeded_store(&mut device, 4);
    let before = store.read_positions(&mut device).unwrap();
    assert!(positions_in_unit_ball(&before));

    let mut render = RenderDriver::new(&mut device, &KernelSource::render());
    render.bind(&mut device, &store).unwrap();
    device.take_ops();

    let mut camera = FlyCamera::default();
    device.begin_frame().unwrap();
    render
        .draw(
            &mut device,
            &store,
            &mut camera,
            &SimulationParameters::default(),
            0.016,
        )
        .unwrap();

    let ops = device.ops();
    assert_eq!(count_ops(&ops, |op| matches!(op, Op::Draw { count: 4, .. })), 1);
    assert_eq!(store.read_positions(&mut device).unwrap(), before);
}

// ============================================================================
// Simulated time
// ============================================================================

#[test]
fn test_clock_freezes_while_stopped() {
    let mut device = RecordingDevice::new();
    let store = seeded_store(&mut device, 64);
    let mut driver = update_driver(&mut device, &store);
    let params = SimulationParameters::default();
    let before = store.read_positions(&mut device).unwrap();
    device.take_ops();

    for _ in 0..20 {
        assert_eq!(
            driver.tick(&mut device, &store, &params, 0.25, 1.0).unwrap(),
            Tick::Idle
        );
    }

    assert_eq!(driver.sim_time(), 0.0);
    assert_eq!(count_ops(&device.ops(), |op| matches!(op, Op::Dispatch { .. })), 0);
    assert_eq!(store.read_positions(&mut device).unwrap(), before);
}

#[test]
fn test_clock_continuity_across_stop() {
    let mut device = RecordingDevice::new();
    let store = seeded_store(&mut device, 16);
    let mut driver = update_driver(&mut device, &store);
    let params = SimulationParameters::default();

    driver.start();
    driver.tick(&mut device, &store, &params, 1.0, 0.0).unwrap();
    assert_eq!(driver.sim_time(), 1.0);

    driver.stop();
    driver.tick(&mut device, &store, &params, 5.0, 0.0).unwrap();
    driver.start();
    driver.tick(&mut device, &store, &params, 1.0, 0.0).unwrap();
    assert_eq!(driver.sim_time(), 2.0);
}

#[test]
fn test_reversed_time_decreases_monotonically() {
    let mut device = RecordingDevice::new();
    let store = seeded_store(&mut device, 1000);
    let mut driver = update_driver(&mut device, &store);
    let mut params = SimulationParameters::default();
    params.sim_speed = -1.0;

    driver.start();
    driver.tick(&mut device, &store, &params, 0.1, 0.0).unwrap();
    let first = driver.sim_time();
    driver.tick(&mut device, &store, &params, 0.1, 0.0).unwrap();
    let second = driver.sim_time();

    assert!(first < 0.0);
    assert!(second < first);
    assert_eq!(driver.param_block().get_f32("deltaTime"), Some(-0.1));
}

#[test]
fn test_uploaded_attractors_are_symmetric() {
    let mut device = RecordingDevice::new();
    let store = seeded_store(&mut device, 8);
    let mut driver = update_driver(&mut device, &store);
    let params = SimulationParameters::default();
    let vertical = params.attractors.vertical_displacement;

    driver.start();
    for _ in 0..5 {
        driver.tick(&mut device, &store, &params, 0.37, 0.0).unwrap();
        let a1 = driver.param_block().get_vec3("attractor1Position").unwrap();
        let a2 = driver.param_block().get_vec3("attractor2Position").unwrap();
        assert!((a1.y - vertical).abs() < 1e-5);
        assert!((a2.y + vertical).abs() < 1e-5);
        assert!((a1.x + a2.x).abs() < 1e-5);
        assert!((a1.z + a2.z).abs() < 1e-5);
    }
}

// ============================================================================
// Barrier discipline
// ============================================================================

#[test]
fn test_barrier_separates_dispatch_from_draw() {
    let (mut driver, clock) = frame_driver(
        SimulationConfig::new().with_particle_count(300).with_seed(3),
        RecordingDevice::new(),
    );
    driver.commands_mut().push(Command::Start);
    driver.device_mut().take_ops();
    clock.advance(0.016);

    let report = driver.frame().unwrap();
    assert_eq!(report.tick, Some(Tick::Dispatched { workgroups: 2 }));

    let ops = driver.device().ops();
    let position = |pred: &dyn Fn(&Op) -> bool| ops.iter().position(pred).unwrap();
    let dispatch = position(&|op| matches!(op, Op::Dispatch { .. }));
    let barrier = position(&|op| matches!(op, Op::MemoryBarrier));
    let draw = position(&|op| matches!(op, Op::Draw { .. }));
    assert!(dispatch < barrier && barrier < draw);
    assert_eq!(ops.last(), Some(&Op::EndFrame));
}

// ============================================================================
// Resizing and allocation failure
// ============================================================================

#[test]
fn test_resize_rebinds_both_passes() {
    let (mut driver, clock) = frame_driver(
        SimulationConfig::new().with_particle_count(100).with_seed(4),
        RecordingDevice::new(),
    );
    driver.commands_mut().push(Command::Start);
    driver.commands_mut().push(Command::SetParticleCount(4));
    clock.advance(0.016);

    let report = driver.frame().unwrap();
    assert_eq!(report.tick, Some(Tick::Dispatched { workgroups: 1 }));
    assert!(report.drawn);
    assert_eq!(driver.store().count(), 4);
    assert_eq!(driver.device().live_buffers(), 3);
    assert_eq!(driver.device().live_bytes(), 3 * 4 * PARTICLE_STRIDE);

    let ops = driver.device().ops();
    assert_eq!(count_ops(&ops, |op| matches!(op, Op::Draw { count: 4, .. })), 1);
}

#[test]
fn test_failed_allocation_is_recoverable() {
    let device = RecordingDevice::new().with_memory_limit(3 * 1000 * PARTICLE_STRIDE);
    let (mut driver, clock) = frame_driver(
        SimulationConfig::new().with_particle_count(1000).with_seed(5),
        device,
    );
    driver.commands_mut().push(Command::Start);
    driver.commands_mut().push(Command::SetParticleCount(1001));
    clock.advance(0.016);

    let report = driver.frame().unwrap();
    assert_eq!(report.tick, None);
    assert!(!report.drawn);
    assert!(!driver.store().is_allocated());
    assert_eq!(driver.device().live_buffers(), 0);
    assert!(matches!(
        driver.last_error(),
        Some(AllocationError::OutOfMemory { .. })
    ));

    // Simulated time stands still while there is nothing to simulate.
    assert_eq!(driver.simulation().sim_time(), 0.0);

    driver.commands_mut().push(Command::SetParticleCount(500));
    clock.advance(0.016);
    let report = driver.frame().unwrap();
    assert!(report.drawn);
    assert!(driver.last_error().is_none());
    assert_eq!(driver.store().count(), 500);
}

#[test]
fn test_count_past_dispatch_limit_is_recoverable() {
    // Ten 64-wide groups per dispatch covers at most 640 particles.
    let device = RecordingDevice::new().with_max_workgroups(10);
    let (mut driver, clock) = frame_driver(
        SimulationConfig::new()
            .with_particle_count(640)
            .with_workgroup_size(64)
            .with_seed(8),
        device,
    );
    driver.commands_mut().push(Command::Start);
    clock.advance(0.016);
    let report = driver.frame().unwrap();
    assert_eq!(report.tick, Some(Tick::Dispatched { workgroups: 10 }));

    driver.commands_mut().push(Command::SetParticleCount(641));
    clock.advance(0.016);
    driver.device_mut().take_ops();
    let report = driver.frame().unwrap();
    assert_eq!(report.tick, None);
    assert!(matches!(
        driver.last_error(),
        Some(AllocationError::TooManyWorkgroups {
            particles: 641,
            workgroups: 11,
            limit: 10
        })
    ));
    assert_eq!(
        count_ops(&driver.device().ops(), |op| matches!(op, Op::Dispatch { .. })),
        0
    );

    driver.commands_mut().push(Command::SetParticleCount(600));
    clock.advance(0.016);
    let report = driver.frame().unwrap();
    assert_eq!(report.tick, Some(Tick::Dispatched { workgroups: 10 }));
    assert!(driver.last_error().is_none());
}

#[test]
fn test_stale_bindings_are_fatal() {
    let mut device = RecordingDevice::new();
    let mut store = seeded_store(&mut device, 8);
    let mut driver = update_driver(&mut device, &store);
    let mut rng = StdRng::seed_from_u64(0);
    store
        .resize(&mut device, 16, &UniformBallSampler, &mut rng)
        .unwrap();

    driver.start();
    let err = driver
        .tick(&mut device, &store, &SimulationParameters::default(), 0.1, 0.0)
        .unwrap_err();
    assert!(matches!(err, SimulationError::StaleBindings));
    assert!(err.is_fatal());
}

// ============================================================================
// Kernels
// ============================================================================

const PARTIAL_UPDATE_KERNEL: &str = r#"
struct Params {
    deltaTime: f32,
    attractor1Position: vec3<f32>,
};

@group(0) @binding(0) var<storage, read_write> positions: array<vec4<f32>>;
@group(0) @binding(1) var<storage, read_write> velocities: array<vec4<f32>>;
@group(0) @binding(2) var<storage, read_write> colors: array<vec4<f32>>;
@group(0) @binding(3) var<uniform> params: Params;

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    let i = id.x;
    if (i >= arrayLength(&positions)) {
        return;
    }
    positions[i] = positions[i] + velocities[i] * params.deltaTime;
}
"#;

#[test]
fn test_undeclared_params_are_skipped_not_fatal() {
    let config = SimulationConfig::new()
        .with_particle_count(128)
        .with_workgroup_size(64)
        .with_update_kernel(PARTIAL_UPDATE_KERNEL)
        .with_seed(6);
    let (mut driver, clock) = frame_driver(config, RecordingDevice::new());
    driver.commands_mut().push(Command::Start);

    for _ in 0..3 {
        clock.advance(0.5);
        let report = driver.frame().unwrap();
        assert_eq!(report.tick, Some(Tick::Dispatched { workgroups: 2 }));
    }

    let block = driver.simulation().param_block();
    assert_eq!(block.get_f32("deltaTime"), Some(0.5));

    // Each undeclared name is recorded once, however many ticks ran.
    let mismatches = driver.simulation().mismatches();
    let names: Vec<&str> = mismatches.iter().map(|m| m.name.as_str()).collect();
    assert!(names.contains(&"floorY"));
    assert!(names.contains(&"gradientStartColor"));
    assert!(!names.contains(&"deltaTime"));
    assert_eq!(
        names.iter().filter(|n| **n == "colorScale").count(),
        1
    );
    assert!(!driver.status().mismatches.is_empty());
}

#[test]
fn test_invalid_update_kernel_is_fatal_once_running() {
    let config = SimulationConfig::new()
        .with_particle_count(8)
        .with_update_kernel("fn main( {")
        .with_seed(7);
    let (mut driver, clock) = frame_driver(config, RecordingDevice::new());
    assert!(!driver.simulation().program().is_valid());

    // Stopped frames never touch the update kernel.
    clock.advance(0.016);
    assert!(driver.frame().unwrap().drawn);

    driver.commands_mut().push(Command::Start);
    clock.advance(0.016);
    let err = driver.frame().unwrap_err();
    assert!(matches!(err, SimulationError::InvalidProgram { .. }));
    assert!(err.is_fatal());
}

// ============================================================================
// Control surface
// ============================================================================

#[test]
fn test_keys_drive_the_state_machine() {
    let (mut driver, clock) = frame_driver(
        SimulationConfig::new().with_particle_count(8).with_seed(8),
        RecordingDevice::new(),
    );

    driver.input_mut().press_key(KeyCode::P);
    clock.advance(0.1);
    driver.frame().unwrap();
    assert_eq!(driver.simulation().state(), RunState::Running);

    driver.input_mut().press_key(KeyCode::T);
    clock.advance(0.1);
    driver.frame().unwrap();
    assert_eq!(driver.params().sim_speed, -1.0);
    assert_eq!(driver.simulation().state(), RunState::Running);

    driver.input_mut().release_key(KeyCode::P);
    driver.input_mut().press_key(KeyCode::P);
    clock.advance(0.1);
    driver.frame().unwrap();
    assert_eq!(driver.simulation().state(), RunState::Stopped);
}

#[test]
fn test_restart_reseeds_without_touching_time() {
    let (mut driver, clock) = frame_driver(
        SimulationConfig::new().with_particle_count(32).with_seed(9),
        RecordingDevice::new(),
    );
    driver.commands_mut().push(Command::Start);
    clock.advance(0.5);
    driver.frame().unwrap();
    let sim_time = driver.simulation().sim_time();

    let (store, device) = driver.store_and_device();
    let before: Vec<Vec4> = store.read_positions(device).unwrap();

    driver.commands_mut().push(Command::Stop);
    driver.commands_mut().push(Command::Restart);
    clock.advance(0.5);
    driver.frame().unwrap();

    let (store, device) = driver.store_and_device();
    let after = store.read_positions(device).unwrap();
    assert_ne!(before, after);
    assert!(positions_in_unit_ball(&after));
    assert_eq!(driver.simulation().sim_time(), sim_time);
    assert_eq!(driver.simulation().state(), RunState::Stopped);
}

#[test]
fn test_param_commands_reach_next_upload() {
    let (mut driver, clock) = frame_driver(
        SimulationConfig::new().with_particle_count(8).with_seed(10),
        RecordingDevice::new(),
    );
    driver.commands_mut().push(Command::Start);
    driver.commands_mut().push(ParamUpdate::SimSpeed(3.0));
    driver.commands_mut().push(ParamUpdate::ColorScale(0.75));
    clock.advance(0.25);
    driver.frame().unwrap();

    let block = driver.simulation().param_block();
    assert_eq!(block.get_f32("deltaTime"), Some(0.75));
    assert_eq!(block.get_f32("colorScale"), Some(0.75));
    assert_eq!(driver.render_driver().param_block().get_f32("particleSize"), Some(0.01));
}

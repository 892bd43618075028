//! Volume-uniform sampling inside the unit ball.
//!
//! Used once per particle when the store is seeded.

use glam::Vec3;
use rand::Rng;

/// Draws points uniformly distributed by volume inside the unit ball.
///
/// The sampler holds no state of its own; every call consumes fresh values
/// from the supplied RNG, so repeated calls form an i.i.d. sequence.
///
/// # Example
///
/// ```ignore
/// use rand::SeedableRng;
///
/// let mut rng = rand::rngs::StdRng::seed_from_u64(7);
/// let p = UniformBallSampler.sample(&mut rng);
/// assert!(p.length() <= 1.0);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformBallSampler;

impl UniformBallSampler {
    /// Draw one point with `|p| <= 1`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec3 {
        let direction = loop {
            let v = Vec3::new(signed_unit(rng), signed_unit(rng), signed_unit(rng));
            if let Some(dir) = unit_direction(v) {
                break dir;
            }
        };

        // r^2 volume element: the radius CDF is r^3, so invert with a cube root.
        let u: f32 = rng.gen();
        // Rounding in the normalize can land a hair outside the ball.
        (direction * u.cbrt()).clamp_length_max(1.0)
    }
}

/// One component of a raw direction draw, in `[-1, 1)`.
fn signed_unit<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    rng.gen::<f32>() * 2.0 - 1.0
}

/// Normalize a raw draw, rejecting the zero vector.
fn unit_direction(v: Vec3) -> Option<Vec3> {
    v.try_normalize()
}

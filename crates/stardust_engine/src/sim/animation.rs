//! Global animation state.
//!
//! A single linear congruential generator drives everything random in the
//! demo: the per-point seed buffer, the palette rotation, and the shader-side
//! turbulence (the current seed value is word 0 of the per-frame constant
//! block). The generator state lives on the CPU and only ever advances; the
//! GPU re-derives per-point randomness from the uploaded seed.

/// Number of palette strip images that the coloring cross-fades between.
pub const PALETTE_COUNT: usize = 5;

const LCG_MUL: u32 = 196_314_165;
const LCG_ADD: u32 = 907_633_515;

/// One step of the demo's linear congruential generator.
#[inline]
pub fn lcg_step(seed: u32) -> u32 {
    seed.wrapping_mul(LCG_MUL).wrapping_add(LCG_ADD)
}

/// Hermite smoothstep, `t*t*(3 - 2t)` for `t` in `[0, 1]`.
#[inline]
pub fn smoothstep(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}

/// Fill a seed buffer: `count` successive LCG values starting from `seed`.
pub fn seed_sequence(seed: u32, count: usize) -> Vec<u32> {
    let mut s = seed;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        s = lcg_step(s);
        out.push(s);
    }
    out
}

/// Per-frame animation state.
///
/// The palette blend factor ramps at 0.25/s; when it passes 1.0 the palette
/// index advances (mod [`PALETTE_COUNT`]), nine generator steps are burned,
/// and the factor snaps back to zero. The transform phase ramps at 0.2/s and
/// wraps at 1.0. Both factors are stored raw; smoothstep easing is applied at
/// the point of use, never fed back into the accumulators.
#[derive(Debug, Clone)]
pub struct AnimationState {
    seed: u32,
    palette_factor: f32,
    palette_index: usize,
    transform_time: f32,
    animating: bool,
}

impl AnimationState {
    /// Starting state for the given seed.
    ///
    /// The generator is warmed up with 54 steps so the first visible frame
    /// does not correlate with the per-point seed buffer, and the transform
    /// phase starts partway in so motion is visible immediately.
    pub fn new(seed: u32) -> Self {
        let mut s = seed;
        for _ in 0..54 {
            s = lcg_step(s);
        }
        Self {
            seed: s,
            palette_factor: 0.0,
            palette_index: 0,
            transform_time: 0.2,
            animating: true,
        }
    }

    /// Advance by `dt` seconds. No-op while animation is paused.
    pub fn update(&mut self, dt: f32) {
        if !self.animating {
            return;
        }
        self.palette_factor += dt * 0.25;
        if self.palette_factor > 1.0 {
            for _ in 0..9 {
                self.seed = lcg_step(self.seed);
            }
            self.palette_factor = 0.0;
            self.palette_index = (self.palette_index + 1) % PALETTE_COUNT;
        }
        self.transform_time += dt * 0.2;
        if self.transform_time > 1.0 {
            self.transform_time = 0.0;
        }
    }

    pub fn toggle_animation(&mut self) {
        self.animating = !self.animating;
    }

    pub fn is_animating(&self) -> bool {
        self.animating
    }

    /// Current generator value, uploaded as constant word 0.
    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Smoothstep-eased palette blend factor for this frame.
    pub fn eased_palette_factor(&self) -> f32 {
        smoothstep(self.palette_factor)
    }

    /// Smoothstep-eased transform phase for this frame.
    pub fn eased_transform_time(&self) -> f32 {
        smoothstep(self.transform_time)
    }

    /// The two palette images the shader cross-fades between.
    pub fn palette_pair(&self) -> (usize, usize) {
        (self.palette_index, (self.palette_index + 1) % PALETTE_COUNT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn generator_progression() {
        let mut s = 23_232_323u32;
        let expected = [
            636_831_818u32,
            1_155_891_901,
            1_512_958_092,
            728_152_167,
            2_255_989_950,
            3_033_276_097,
        ];
        for want in expected {
            s = lcg_step(s);
            assert_eq!(s, want);
        }
    }

    #[test]
    fn generator_wraps_instead_of_overflowing() {
        let _ = lcg_step(u32::MAX);
    }

    #[test]
    fn new_state_is_warmed_up() {
        let state = AnimationState::new(23_232_323);
        assert_eq!(state.seed(), 2_514_186_609);
        assert_eq!(state.palette_pair(), (0, 1));
    }

    #[test]
    fn seed_sequence_is_deterministic() {
        let a = seed_sequence(23_232_323, 1000);
        let b = seed_sequence(23_232_323, 1000);
        assert_eq!(a, b);
        assert_eq!(a[0], 636_831_818);
        assert_eq!(a.len(), 1000);
    }

    #[test]
    fn smoothstep_endpoints_and_midpoint() {
        assert_relative_eq!(smoothstep(0.0), 0.0);
        assert_relative_eq!(smoothstep(0.5), 0.5);
        assert_relative_eq!(smoothstep(1.0), 1.0);
        assert!(smoothstep(0.25) < 0.25);
        assert!(smoothstep(0.75) > 0.75);
    }

    #[test]
    fn easing_is_not_fed_back() {
        // Reading the eased factor must not disturb the raw accumulator:
        // two equal updates land at the same linear position.
        let mut a = AnimationState::new(1);
        let mut b = AnimationState::new(1);
        a.update(0.1);
        let _ = a.eased_palette_factor();
        let _ = a.eased_transform_time();
        a.update(0.1);
        b.update(0.2);
        assert_relative_eq!(
            a.eased_palette_factor(),
            b.eased_palette_factor(),
            epsilon = 1e-6
        );
    }

    #[test]
    fn palette_rotates_once_per_four_seconds() {
        let mut state = AnimationState::new(23_232_323);
        let dt = 1.0 / 60.0;
        // 18 simulated seconds: rotations land near 4, 8, 12, and 16 s.
        for _ in 0..(18 * 60) {
            state.update(dt);
        }
        assert_eq!(state.palette_pair(), (4, 0));
    }

    #[test]
    fn transform_phase_wraps_once_per_five_seconds() {
        let mut state = AnimationState::new(23_232_323);
        let dt = 1.0 / 60.0;
        let mut wraps = 0;
        let mut prev = state.eased_transform_time();
        // Phase starts at 0.2, so the first wrap lands near 4 s and the
        // rest five seconds apart: 3 wraps in 18 simulated seconds.
        for _ in 0..(18 * 60) {
            state.update(dt);
            let now = state.eased_transform_time();
            if now < prev {
                wraps += 1;
            }
            prev = now;
        }
        assert_eq!(wraps, 3);
    }

    #[test]
    fn paused_state_is_frozen() {
        let mut state = AnimationState::new(23_232_323);
        state.update(0.5);
        let seed = state.seed();
        let factor = state.eased_palette_factor();
        state.toggle_animation();
        for _ in 0..600 {
            state.update(1.0 / 60.0);
        }
        assert_eq!(state.seed(), seed);
        assert_relative_eq!(state.eased_palette_factor(), factor);
        state.toggle_animation();
        state.update(1.0 / 60.0);
        assert!(state.eased_palette_factor() > factor);
    }

    #[test]
    fn palette_rotation_burns_nine_generator_steps() {
        let mut state = AnimationState::new(23_232_323);
        let before = state.seed();
        // One big step pushes the factor past 1.0 immediately.
        state.update(5.0);
        let mut expected = before;
        for _ in 0..9 {
            expected = lcg_step(expected);
        }
        assert_eq!(state.seed(), expected);
        assert_eq!(state.palette_pair(), (1, 2));
        assert_relative_eq!(state.eased_palette_factor(), 0.0);
    }
}

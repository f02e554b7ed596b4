// Per-lane random state: four floats in [0, 1).
// Mirrors `advance` in trace.wgsl bit for bit

const UNIT: f32 = 16777216.;

pub fn pcg(v: u32) -> u32 {
    let state = v
        .wrapping_mul(747796405)
        .wrapping_add(2891336453);
    let word = ((state >> ((state >> 28) + 4)) ^ state)
        .wrapping_mul(277803737);

    (word >> 22) ^ word
}

// 24 bits is all an f32 in [0, 1) can hold exactly
fn to_unit(v: u32) -> f32 {
    (v >> 8) as f32 / UNIT
}

fn from_unit(f: f32) -> u32 {
    (f * UNIT) as u32
}

// Hash chain over the four words, so no component
// repeats the one before it
pub fn advance(rng: [f32; 4]) -> [f32; 4] {
    let [x, y, z, w] = rng.map(from_unit);

    let h0 = pcg(x ^ pcg(w));
    let h1 = pcg(y ^ h0);
    let h2 = pcg(z ^ h1);
    let h3 = pcg(w ^ h2);

    [h0, h1, h2, h3].map(to_unit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_in_unit_interval() {
        let mut state = [0.25, 0.5, 0.75, 0.999];

        for _ in 0..1000 {
            state = advance(state);

            assert!(state.iter().all(|v| (0. ..1.).contains(v)));
        }
    }

    #[test]
    fn is_deterministic_and_moves() {
        let state = [0.1, 0.2, 0.3, 0.4];

        assert_eq!(advance(state), advance(state));
        assert_ne!(advance(state), state);
        assert_ne!(advance(advance(state)), advance(state));
    }

    #[test]
    fn zero_state_does_not_stick() {
        assert_ne!(advance([0.; 4]), [0.; 4]);
    }
}

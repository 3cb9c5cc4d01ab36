//! Second-order lowpass filter.

/// RBJ cookbook biquad configured as a lowpass, transposed direct form II.
#[derive(Debug, Clone)]
pub(crate) struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    z1: f32,
    z2: f32,
}

impl Biquad {
    pub fn lowpass(cutoff_hz: f32, q: f32, sample_rate: u32) -> Self {
        let nyquist = sample_rate as f32 / 2.0;
        // Cutoffs at or above Nyquist pass everything through.
        if cutoff_hz >= nyquist {
            return Self::passthrough();
        }

        let w0 = 2.0 * std::f32::consts::PI * cutoff_hz / sample_rate as f32;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);
        let a0 = 1.0 + alpha;

        Self {
            b0: (1.0 - cos_w0) / 2.0 / a0,
            b1: (1.0 - cos_w0) / a0,
            b2: (1.0 - cos_w0) / 2.0 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    fn passthrough() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    pub fn process(&mut self, samples: &mut [f32]) {
        for sample in samples {
            let x = *sample;
            let y = self.b0 * x + self.z1;
            self.z1 = self.b1 * x - self.a1 * y + self.z2;
            self.z2 = self.b2 * x - self.a2 * y;
            *sample = y;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    fn sine(frequency: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                (2.0 * std::f32::consts::PI * frequency * i as f32 / sample_rate as f32).sin()
            })
            .collect()
    }

    #[test]
    fn test_dc_passes_with_unity_gain() {
        let mut filter = Biquad::lowpass(6000.0, std::f32::consts::FRAC_1_SQRT_2, 48000);
        let mut samples = vec![1.0; 4800];
        filter.process(&mut samples);
        assert!((samples[4799] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_attenuates_above_cutoff() {
        let mut filter = Biquad::lowpass(6000.0, std::f32::consts::FRAC_1_SQRT_2, 48000);
        let mut low = sine(200.0, 48000, 9600);
        let mut high = sine(18000.0, 48000, 9600);

        filter.process(&mut low);
        let mut filter = Biquad::lowpass(6000.0, std::f32::consts::FRAC_1_SQRT_2, 48000);
        filter.process(&mut high);

        // Skip the transient before comparing.
        assert!(rms(&low[4800..]) > 0.65);
        assert!(rms(&high[4800..]) < 0.1);
    }

    #[test]
    fn test_cutoff_above_nyquist_is_passthrough() {
        let mut filter = Biquad::lowpass(12000.0, 0.7, 16000);
        let mut samples = vec![0.5, -0.25, 0.125];
        filter.process(&mut samples);
        assert_eq!(samples, vec![0.5, -0.25, 0.125]);
    }
}

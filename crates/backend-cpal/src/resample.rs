// Channel conversion and rate conversion for the output path

/// Convert interleaved samples between channel layouts.
/// Mono fans out to every channel, anything folds to mono by averaging,
/// and other layouts keep the channels both sides have and silence the rest.
pub fn map_channels(input: &[f32], from: u16, to: u16) -> Vec<f32> {
    let (from, to) = (from.max(1) as usize, to.max(1) as usize);
    if from == to {
        return input.to_vec();
    }

    let frames = input.len() / from;
    let mut output = Vec::with_capacity(frames * to);

    for frame in input.chunks_exact(from) {
        if to == 1 {
            output.push(frame.iter().sum::<f32>() / from as f32);
            continue;
        }
        for ch in 0..to {
            let sample = if from == 1 {
                frame[0]
            } else if ch < from {
                frame[ch]
            } else {
                0.0
            };
            output.push(sample);
        }
    }

    output
}

/// Streaming linear-interpolation resampler.
///
/// Keeps the last frame of each block so interpolation continues smoothly
/// across block boundaries. Output lags input by one frame.
pub struct LinearResampler {
    channels: usize,
    /// Input frames consumed per output frame
    step: f64,
    /// Read position, in frames, relative to `prev`
    pos: f64,
    prev: Vec<f32>,
}

impl LinearResampler {
    pub fn new(channels: u16, input_rate: u32, output_rate: u32) -> Self {
        let mut resampler = Self {
            channels: channels.max(1) as usize,
            step: 1.0,
            pos: 0.0,
            prev: Vec::new(),
        };
        resampler.set_rates(input_rate, output_rate, 1.0);
        resampler
    }

    /// Retune without dropping state. `speed` above 1.0 consumes input faster.
    pub fn set_rates(&mut self, input_rate: u32, output_rate: u32, speed: f32) {
        let speed = if speed.is_finite() && speed > 0.0 {
            speed as f64
        } else {
            1.0
        };
        self.step = input_rate.max(1) as f64 * speed / output_rate.max(1) as f64;
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    /// Forget history, for use after a seek
    pub fn reset(&mut self) {
        self.pos = 0.0;
        self.prev.clear();
    }

    /// Resample one block of interleaved frames, appending to `output`
    pub fn process(&mut self, input: &[f32], output: &mut Vec<f32>) {
        let ch = self.channels;
        let mut input = &input[..input.len() - input.len() % ch];
        if input.is_empty() {
            return;
        }

        if self.prev.is_empty() {
            self.prev.extend_from_slice(&input[..ch]);
            input = &input[ch..];
            self.pos = 0.0;
        }

        let frames = input.len() / ch;
        // Frame 0 is `prev`, frame k is input frame k - 1
        let frame_at = |index: usize, c: usize| -> f32 {
            if index == 0 {
                self.prev[c]
            } else {
                input[(index - 1) * ch + c]
            }
        };

        let total = frames + 1;
        output.reserve((frames as f64 / self.step) as usize * ch + ch);
        let mut pos = self.pos;
        while (pos as usize) + 1 < total {
            let index = pos as usize;
            let frac = (pos - index as f64) as f32;
            for c in 0..ch {
                let a = frame_at(index, c);
                let b = frame_at(index + 1, c);
                output.push(a + (b - a) * frac);
            }
            pos += self.step;
        }

        if frames > 0 {
            self.prev.copy_from_slice(&input[(frames - 1) * ch..]);
        }
        self.pos = pos - frames as f64;
    }
}

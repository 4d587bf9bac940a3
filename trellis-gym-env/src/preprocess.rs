//! Frame preprocessing: grayscale, subsample, delta-encode.
use crate::RawFrame;
use serde::{Deserialize, Serialize};
use trellis_core::{Obs, PlanarObs};

/// A preprocessed observation: the current grayscale plane plus its delta
/// against the previous frame. The byte planes and the mostly-zero deltas
/// compress well on the observation tape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocObs {
    /// Current grayscale plane, row-major.
    pub cur: Vec<u8>,

    /// Current minus previous plane; all zeros on the first frame.
    pub delta: Vec<i16>,

    /// Plane height in pixels.
    pub height: usize,

    /// Plane width in pixels.
    pub width: usize,
}

impl Obs for PreprocObs {}

impl PlanarObs for PreprocObs {
    fn channels(&self) -> usize {
        2
    }

    fn height(&self) -> usize {
        self.height
    }

    fn width(&self) -> usize {
        self.width
    }

    fn write_planes(&self, out: &mut Vec<f32>) {
        out.extend(self.cur.iter().map(|&v| v as f32 / 255.0));
        out.extend(self.delta.iter().map(|&v| v as f32 / 255.0));
    }
}

/// Converts raw frames into [`PreprocObs`] values, retaining exactly one
/// plane between calls for the delta channel.
///
/// Each environment slot owns its own preprocessor; sharing one across
/// slots would corrupt the delta channels across episodes.
pub struct FramePreprocessor {
    out_height: usize,
    out_width: usize,
    prev: Option<Vec<u8>>,
}

impl FramePreprocessor {
    /// Creates a preprocessor for `src_height x src_width` source frames.
    /// Output planes are subsampled 2x in both axes.
    pub fn new(src_height: usize, src_width: usize) -> Self {
        Self {
            out_height: src_height / 2,
            out_width: src_width / 2,
            prev: None,
        }
    }

    /// Output plane height.
    pub fn out_height(&self) -> usize {
        self.out_height
    }

    /// Output plane width.
    pub fn out_width(&self) -> usize {
        self.out_width
    }

    /// Forgets the retained plane; the next delta is all zeros.
    pub fn reset(&mut self) {
        self.prev = None;
    }

    /// Emits the two-plane observation for a frame and retains its
    /// grayscale plane for the next delta. Constant time and constant
    /// memory per call.
    pub fn process(&mut self, frame: &RawFrame) -> PreprocObs {
        debug_assert_eq!(frame.data.len(), frame.height * frame.width * 3);
        debug_assert_eq!(frame.height / 2, self.out_height);
        debug_assert_eq!(frame.width / 2, self.out_width);

        let mut cur = Vec::with_capacity(self.out_height * self.out_width);
        for y in 0..self.out_height {
            for x in 0..self.out_width {
                let idx = (2 * y * frame.width + 2 * x) * 3;
                let r = frame.data[idx] as u16;
                let g = frame.data[idx + 1] as u16;
                let b = frame.data[idx + 2] as u16;
                cur.push(((r + g + b) / 3) as u8);
            }
        }
        let delta = match &self.prev {
            Some(prev) => cur
                .iter()
                .zip(prev)
                .map(|(&c, &p)| c as i16 - p as i16)
                .collect(),
            None => vec![0i16; cur.len()],
        };
        self.prev = Some(cur.clone());
        PreprocObs {
            cur,
            delta,
            height: self.out_height,
            width: self.out_width,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(height: usize, width: usize, f: impl Fn(usize, usize) -> u8) -> RawFrame {
        let mut data = Vec::with_capacity(height * width * 3);
        for y in 0..height {
            for x in 0..width {
                let v = f(y, x);
                data.extend_from_slice(&[v, v, v]);
            }
        }
        RawFrame {
            data,
            height,
            width,
        }
    }

    #[test]
    fn first_delta_is_all_zero() {
        let mut pp = FramePreprocessor::new(4, 4);
        let obs = pp.process(&frame(4, 4, |y, x| (y * 4 + x) as u8));
        assert_eq!(obs.height, 2);
        assert_eq!(obs.width, 2);
        assert!(obs.delta.iter().all(|&d| d == 0));
    }

    #[test]
    fn delta_is_current_minus_previous() {
        let mut pp = FramePreprocessor::new(4, 4);
        pp.process(&frame(4, 4, |_, _| 10));
        let obs = pp.process(&frame(4, 4, |_, _| 250));
        assert!(obs.cur.iter().all(|&c| c == 250));
        assert!(obs.delta.iter().all(|&d| d == 240));

        let obs = pp.process(&frame(4, 4, |_, _| 50));
        assert!(obs.delta.iter().all(|&d| d == -200));
    }

    #[test]
    fn subsampling_takes_every_second_pixel() {
        let mut pp = FramePreprocessor::new(4, 6);
        let obs = pp.process(&frame(4, 6, |y, x| (10 * y + x) as u8));
        // Rows 0 and 2, columns 0, 2 and 4.
        assert_eq!(obs.cur, vec![0, 2, 4, 20, 22, 24]);
    }

    #[test]
    fn reset_zeroes_the_next_delta() {
        let mut pp = FramePreprocessor::new(4, 4);
        pp.process(&frame(4, 4, |_, _| 10));
        pp.reset();
        let obs = pp.process(&frame(4, 4, |_, _| 200));
        assert!(obs.delta.iter().all(|&d| d == 0));
    }

    #[test]
    fn planes_scale_to_unit_range() {
        let mut pp = FramePreprocessor::new(2, 2);
        pp.process(&frame(2, 2, |_, _| 0));
        let obs = pp.process(&frame(2, 2, |_, _| 255));
        let mut planes = Vec::new();
        obs.write_planes(&mut planes);
        assert_eq!(planes.len(), 2);
        assert!((planes[0] - 1.0).abs() < 1e-6);
        assert!((planes[1] - 1.0).abs() < 1e-6);
    }
}

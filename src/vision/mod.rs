// FrameDiffer - per-frame motion and brightness anomaly detection
//
// Runs synchronously on the camera callback thread, once per delivered
// frame:
// 1. Pack the strided luminance plane into a contiguous grayscale buffer
// 2. Count pixels whose absolute difference from the previous frame
//    exceeds the per-pixel threshold; ratio = changed / total
// 3. Ratio above the motion threshold -> Motion (intensity = ratio)
// 4. Otherwise compare mean luminance against the previous mean ->
//    LightChange (intensity = capped relative change)
//
// At most one anomaly per frame; motion takes priority. The previous
// frame buffer is owned and swapped in place, so the hot path performs
// no per-frame allocation once capacity has been reached.

use crate::config::VisionConfig;
use crate::error::VisionError;
use crate::events::{Region, VisualAnomalyKind};

/// Borrowed view of a single-channel luminance plane.
///
/// `row_stride` and `pixel_stride` describe the platform camera layout;
/// a tightly packed plane has `row_stride == width` and
/// `pixel_stride == 1`.
#[derive(Debug, Clone, Copy)]
pub struct LuminancePlane<'a> {
    pub data: &'a [u8],
    pub width: usize,
    pub height: usize,
    pub row_stride: usize,
    pub pixel_stride: usize,
}

impl<'a> LuminancePlane<'a> {
    /// View over a tightly packed width x height plane.
    pub fn packed(data: &'a [u8], width: usize, height: usize) -> Self {
        Self {
            data,
            width,
            height,
            row_stride: width,
            pixel_stride: 1,
        }
    }

    /// Number of bytes the declared geometry reaches into `data`.
    fn required_len(&self) -> usize {
        if self.width == 0 || self.height == 0 {
            return 0;
        }
        (self.height - 1) * self.row_stride + (self.width - 1) * self.pixel_stride + 1
    }
}

/// Outcome of a processed frame, before the engine stamps a timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct VisualEvent {
    pub kind: VisualAnomalyKind,
    pub intensity: f32,
    /// Affected region; region computation is not implemented, so the
    /// differ always reports None
    pub region: Option<Region>,
}

/// Stateful per-frame differencer.
///
/// Owned exclusively by the engine and driven from the camera thread;
/// the internal buffers are never shared.
pub struct FrameDiffer {
    config: VisionConfig,
    prev: Vec<u8>,
    scratch: Vec<u8>,
    prev_mean: f64,
    has_prev: bool,
    frame_index: u64,
}

impl FrameDiffer {
    pub fn new(config: VisionConfig) -> Self {
        Self {
            config,
            prev: Vec::new(),
            scratch: Vec::new(),
            prev_mean: 0.0,
            has_prev: false,
            frame_index: 0,
        }
    }

    /// Process one luminance plane and report at most one anomaly.
    ///
    /// Errors are transient: the frame is rejected before any internal
    /// state is touched, so the next frame diffs against the last good
    /// one. The caller logs and treats an error as "no anomaly".
    pub fn process_frame(
        &mut self,
        plane: &LuminancePlane<'_>,
    ) -> Result<Option<VisualEvent>, VisionError> {
        if plane.width == 0 || plane.height == 0 {
            return Err(VisionError::InvalidDimensions {
                width: plane.width,
                height: plane.height,
            });
        }
        let required = plane.required_len();
        if plane.data.len() < required {
            return Err(VisionError::PlaneTooSmall {
                expected: required,
                actual: plane.data.len(),
            });
        }

        let index = self.frame_index;
        self.frame_index += 1;
        let every_n = self.config.process_every_n_frames.max(1);
        if every_n > 1 && index % every_n != 0 {
            return Ok(None);
        }

        let total = plane.width * plane.height;

        // Pack the strided plane into the scratch buffer, summing for
        // the mean in the same pass.
        self.scratch.clear();
        self.scratch.reserve(total);
        let mut luma_sum: u64 = 0;
        for y in 0..plane.height {
            let row = y * plane.row_stride;
            for x in 0..plane.width {
                let value = plane.data[row + x * plane.pixel_stride];
                luma_sum += value as u64;
                self.scratch.push(value);
            }
        }
        let mean = luma_sum as f64 / total as f64;

        let mut event = None;

        if self.has_prev && self.prev.len() == total {
            let changed = self
                .prev
                .iter()
                .zip(self.scratch.iter())
                .filter(|(&p, &c)| {
                    (p as i16 - c as i16).unsigned_abs() > self.config.pixel_diff_threshold as u16
                })
                .count();
            let ratio = changed as f32 / total as f32;
            if ratio > self.config.motion_ratio_threshold {
                event = Some(VisualEvent {
                    kind: VisualAnomalyKind::Motion,
                    intensity: ratio,
                    region: None,
                });
            }
        }

        // Brightness is only evaluated when motion did not fire and a
        // nonzero baseline mean exists.
        if event.is_none() && self.has_prev && self.prev_mean > 0.0 {
            let ratio = ((mean - self.prev_mean).abs() / self.prev_mean) as f32;
            if ratio > self.config.brightness_ratio_threshold {
                event = Some(VisualEvent {
                    kind: VisualAnomalyKind::LightChange,
                    intensity: ratio.min(1.0),
                    region: None,
                });
            }
        }

        // Previous plane and mean update unconditionally, anomaly or not.
        std::mem::swap(&mut self.prev, &mut self.scratch);
        self.prev_mean = mean;
        self.has_prev = true;

        Ok(event)
    }

    /// Drop all per-frame state, as if freshly constructed.
    pub fn reset(&mut self) {
        self.prev.clear();
        self.scratch.clear();
        self.prev_mean = 0.0;
        self.has_prev = false;
        self.frame_index = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn differ() -> FrameDiffer {
        FrameDiffer::new(VisionConfig::default())
    }

    fn frame(width: usize, height: usize, value: u8) -> Vec<u8> {
        vec![value; width * height]
    }

    #[test]
    fn test_first_frame_never_fires() {
        let mut differ = differ();
        let data = frame(8, 8, 200);
        let event = differ
            .process_frame(&LuminancePlane::packed(&data, 8, 8))
            .unwrap();
        assert_eq!(event, None);
    }

    #[test]
    fn test_identical_frames_are_quiet() {
        let mut differ = differ();
        let data = frame(16, 16, 120);
        let plane = LuminancePlane::packed(&data, 16, 16);
        differ.process_frame(&plane).unwrap();
        let event = differ.process_frame(&plane).unwrap();
        assert_eq!(event, None, "identical frames must not fire");
    }

    #[test]
    fn test_full_frame_change_is_max_intensity_motion() {
        let mut differ = differ();
        let dark = frame(16, 16, 10);
        let bright = frame(16, 16, 50); // +40, above the per-pixel threshold of 30
        differ
            .process_frame(&LuminancePlane::packed(&dark, 16, 16))
            .unwrap();
        let event = differ
            .process_frame(&LuminancePlane::packed(&bright, 16, 16))
            .unwrap()
            .expect("motion should fire");
        assert_eq!(event.kind, VisualAnomalyKind::Motion);
        assert_eq!(event.intensity, 1.0);
        assert_eq!(event.region, None);
    }

    #[test]
    fn test_motion_intensity_is_exact_change_ratio() {
        let mut differ = differ();
        let base = frame(10, 10, 100);
        let mut next = base.clone();
        // Change 20 of 100 pixels well past the threshold
        for value in next.iter_mut().take(20) {
            *value = 200;
        }
        differ
            .process_frame(&LuminancePlane::packed(&base, 10, 10))
            .unwrap();
        let event = differ
            .process_frame(&LuminancePlane::packed(&next, 10, 10))
            .unwrap()
            .expect("motion should fire");
        assert_eq!(event.kind, VisualAnomalyKind::Motion);
        assert!((event.intensity - 0.20).abs() < f32::EPSILON);
    }

    #[test]
    fn test_sub_threshold_pixel_deltas_do_not_count() {
        let mut differ = differ();
        let base = frame(10, 10, 100);
        let next = frame(10, 10, 120); // +20, below the per-pixel threshold
        differ
            .process_frame(&LuminancePlane::packed(&base, 10, 10))
            .unwrap();
        let event = differ
            .process_frame(&LuminancePlane::packed(&next, 10, 10))
            .unwrap();
        // Mean ratio 0.2 is also below the brightness threshold
        assert_eq!(event, None);
    }

    #[test]
    fn test_light_change_fires_when_motion_ratio_is_low() {
        let mut differ = differ();
        let base = frame(10, 10, 50);
        let mut next = base.clone();
        // 14 changed pixels (14% <= motion threshold) but a large mean jump
        for value in next.iter_mut().take(14) {
            *value = 255;
        }
        differ
            .process_frame(&LuminancePlane::packed(&base, 10, 10))
            .unwrap();
        let event = differ
            .process_frame(&LuminancePlane::packed(&next, 10, 10))
            .unwrap()
            .expect("light change should fire");
        assert_eq!(event.kind, VisualAnomalyKind::LightChange);
        // mean: 50 -> 78.7, ratio 0.574
        assert!((event.intensity - 0.574).abs() < 1e-3);
    }

    #[test]
    fn test_light_change_intensity_is_capped() {
        let mut differ = FrameDiffer::new(VisionConfig {
            // Disable motion so a full-frame brightness jump reaches the
            // brightness branch
            pixel_diff_threshold: 255,
            ..VisionConfig::default()
        });
        let dim = frame(8, 8, 20);
        let bright = frame(8, 8, 240); // ratio 11.0, capped to 1.0
        differ
            .process_frame(&LuminancePlane::packed(&dim, 8, 8))
            .unwrap();
        let event = differ
            .process_frame(&LuminancePlane::packed(&bright, 8, 8))
            .unwrap()
            .expect("light change should fire");
        assert_eq!(event.kind, VisualAnomalyKind::LightChange);
        assert_eq!(event.intensity, 1.0);
    }

    #[test]
    fn test_black_baseline_never_fires_brightness() {
        let mut differ = FrameDiffer::new(VisionConfig {
            pixel_diff_threshold: 255,
            ..VisionConfig::default()
        });
        let black = frame(8, 8, 0);
        let bright = frame(8, 8, 200);
        differ
            .process_frame(&LuminancePlane::packed(&black, 8, 8))
            .unwrap();
        // Previous mean is zero, so the ratio is undefined and skipped
        let event = differ
            .process_frame(&LuminancePlane::packed(&bright, 8, 8))
            .unwrap();
        assert_eq!(event, None);
    }

    #[test]
    fn test_strided_plane_is_unpacked() {
        let mut differ = differ();
        // 4x2 plane with pixel_stride 2 and row_stride 10: only every
        // other byte belongs to the image
        let mut data = vec![0u8; 20];
        for y in 0..2 {
            for x in 0..4 {
                data[y * 10 + x * 2] = 100;
            }
        }
        let plane = LuminancePlane {
            data: &data,
            width: 4,
            height: 2,
            row_stride: 10,
            pixel_stride: 2,
        };
        differ.process_frame(&plane).unwrap();

        let mut moved = vec![0u8; 20];
        for y in 0..2 {
            for x in 0..4 {
                moved[y * 10 + x * 2] = 200;
            }
        }
        let plane = LuminancePlane {
            data: &moved,
            width: 4,
            height: 2,
            row_stride: 10,
            pixel_stride: 2,
        };
        let event = differ.process_frame(&plane).unwrap().expect("motion");
        assert_eq!(event.intensity, 1.0);
    }

    #[test]
    fn test_short_plane_is_rejected_without_corrupting_state() {
        let mut differ = differ();
        let good = frame(8, 8, 10);
        differ
            .process_frame(&LuminancePlane::packed(&good, 8, 8))
            .unwrap();

        let short = vec![0u8; 10];
        let err = differ
            .process_frame(&LuminancePlane::packed(&short, 8, 8))
            .unwrap_err();
        assert!(matches!(err, VisionError::PlaneTooSmall { .. }));

        // The stored baseline still belongs to the last good frame
        let moved = frame(8, 8, 50);
        let event = differ
            .process_frame(&LuminancePlane::packed(&moved, 8, 8))
            .unwrap()
            .expect("motion against the pre-error baseline");
        assert_eq!(event.intensity, 1.0);
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        let mut differ = differ();
        let data = vec![0u8; 4];
        let err = differ
            .process_frame(&LuminancePlane::packed(&data, 0, 4))
            .unwrap_err();
        assert!(matches!(err, VisionError::InvalidDimensions { .. }));
    }

    #[test]
    fn test_frame_skipping() {
        let mut differ = FrameDiffer::new(VisionConfig {
            process_every_n_frames: 2,
            ..VisionConfig::default()
        });
        let a = frame(8, 8, 10);
        let b = frame(8, 8, 50);
        differ
            .process_frame(&LuminancePlane::packed(&a, 8, 8))
            .unwrap();
        // Frame 1 is skipped entirely: no diff, no baseline update
        let event = differ
            .process_frame(&LuminancePlane::packed(&b, 8, 8))
            .unwrap();
        assert_eq!(event, None);
        // Frame 2 diffs against frame 0
        let event = differ
            .process_frame(&LuminancePlane::packed(&b, 8, 8))
            .unwrap()
            .expect("motion vs frame 0");
        assert_eq!(event.intensity, 1.0);
    }

    #[test]
    fn test_reset_forgets_baseline() {
        let mut differ = differ();
        let a = frame(8, 8, 10);
        let b = frame(8, 8, 50);
        differ
            .process_frame(&LuminancePlane::packed(&a, 8, 8))
            .unwrap();
        differ.reset();
        let event = differ
            .process_frame(&LuminancePlane::packed(&b, 8, 8))
            .unwrap();
        assert_eq!(event, None, "first frame after reset must not fire");
    }
}

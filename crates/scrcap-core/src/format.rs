//! Video/audio format types and the plane-layout table.
//!
//! The per-format plane layout (count, stride, offset) is a pure function of
//! `(format, width, height)`. It is expressed here as a lookup
//! (`PixelFormat::plane_layout`) rather than a switch duplicated between the
//! CPU and GPU delivery paths, per the design note "Plane table as data, not
//! code".

/// Pixel formats a requested or negotiated video format can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Bgra32,
    Rgba32,
    Argb32,
    Abgr32,
    Bgrx32,
    Rgb24,
    Bgr24,
    I420,
    Nv12,
    Nv21,
    Yuy2,
    Uyvy,
    Mjpeg,
    Unknown,
}

impl Default for PixelFormat {
    fn default() -> Self {
        Self::Unknown
    }
}

/// The layout of a single plane within a frame's backing resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub offset: usize,
}

impl PixelFormat {
    /// Number of logical planes this format decomposes into, per §4.3:
    /// I420=3, NV12/NV21=2, everything else=1, Unknown=0.
    #[must_use]
    pub fn plane_count(self) -> usize {
        match self {
            Self::Unknown => 0,
            Self::I420 => 3,
            Self::Nv12 | Self::Nv21 => 2,
            _ => 1,
        }
    }

    /// Bytes per pixel for packed (single-plane, non-MJPEG) formats.
    #[must_use]
    pub fn bytes_per_pixel(self) -> Option<u32> {
        match self {
            Self::Bgra32 | Self::Rgba32 | Self::Argb32 | Self::Abgr32 | Self::Bgrx32 => Some(4),
            Self::Rgb24 | Self::Bgr24 => Some(3),
            Self::Yuy2 | Self::Uyvy => Some(2),
            Self::I420 | Self::Nv12 | Self::Nv21 | Self::Mjpeg | Self::Unknown => None,
        }
    }

    /// Derive the plane layout for `width`x`height`, laid out contiguously
    /// from offset 0 (§4.3 "Plane Derivation").
    ///
    /// Unknown falls back to one plane with stride = width*4, matching the
    /// source's documented fallback (with a warning left to the caller,
    /// since this function has no logging side effects).
    #[must_use]
    pub fn plane_layout(self, width: u32, height: u32) -> Vec<PlaneLayout> {
        match self {
            Self::I420 => {
                let y_stride = width;
                let y_size = (y_stride as usize) * (height as usize);
                let chroma_w = width.div_ceil(2);
                let chroma_h = height.div_ceil(2);
                let chroma_stride = chroma_w;
                let chroma_size = (chroma_stride as usize) * (chroma_h as usize);
                vec![
                    PlaneLayout { width, height, stride: y_stride, offset: 0 },
                    PlaneLayout {
                        width: chroma_w,
                        height: chroma_h,
                        stride: chroma_stride,
                        offset: y_size,
                    },
                    PlaneLayout {
                        width: chroma_w,
                        height: chroma_h,
                        stride: chroma_stride,
                        offset: y_size + chroma_size,
                    },
                ]
            }
            Self::Nv12 | Self::Nv21 => {
                let y_stride = width;
                let y_size = (y_stride as usize) * (height as usize);
                let chroma_h = height.div_ceil(2);
                vec![
                    PlaneLayout { width, height, stride: y_stride, offset: 0 },
                    PlaneLayout {
                        width,
                        height: chroma_h,
                        stride: width,
                        offset: y_size,
                    },
                ]
            }
            Self::Unknown => vec![PlaneLayout {
                width,
                height,
                stride: width * 4,
                offset: 0,
            }],
            _ => {
                let bpp = self.bytes_per_pixel().unwrap_or(4);
                vec![PlaneLayout {
                    width,
                    height,
                    stride: width * bpp,
                    offset: 0,
                }]
            }
        }
    }
}

/// Numerator/denominator frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate {
    pub numerator: u32,
    pub denominator: u32,
}

impl FrameRate {
    #[must_use]
    pub fn new(numerator: u32, denominator: u32) -> Self {
        Self { numerator, denominator }
    }

    /// Approximate frames per second as an `f64`; falls back to the default
    /// 30 FPS if the denominator is zero or the numerator is zero.
    #[must_use]
    pub fn as_fps(self) -> f64 {
        if self.numerator == 0 || self.denominator == 0 {
            30.0
        } else {
            f64::from(self.numerator) / f64::from(self.denominator)
        }
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::new(30, 1)
    }
}

/// Whether the application wants host-readable pixels or a zero-copy GPU
/// handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputPreference {
    Cpu,
    Gpu,
}

impl Default for OutputPreference {
    fn default() -> Self {
        Self::Cpu
    }
}

/// Video format requested by the application at configure time.
///
/// Width/height of zero means "native"; zero/invalid frame rate falls back
/// to [`RequestedVideoFormat::with_defaults_applied`]'s documented default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestedVideoFormat {
    pub pixel_format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    pub output_preference: OutputPreference,
}

impl Default for RequestedVideoFormat {
    fn default() -> Self {
        Self {
            pixel_format: PixelFormat::Bgra32,
            width: 0,
            height: 0,
            frame_rate: FrameRate::default(),
            output_preference: OutputPreference::default(),
        }
    }
}

impl RequestedVideoFormat {
    /// Replace zero/invalid fields with the documented defaults (§6
    /// "Default formats"): BGRA32, 1920x1080 if no producer dimensions are
    /// known yet, 30 FPS.
    #[must_use]
    pub fn with_defaults_applied(self) -> Self {
        Self {
            pixel_format: if matches!(self.pixel_format, PixelFormat::Unknown) {
                PixelFormat::Bgra32
            } else {
                self.pixel_format
            },
            width: if self.width == 0 { 1920 } else { self.width },
            height: if self.height == 0 { 1080 } else { self.height },
            frame_rate: if self.frame_rate.numerator == 0 || self.frame_rate.denominator == 0 {
                FrameRate::default()
            } else {
                self.frame_rate
            },
            output_preference: self.output_preference,
        }
    }
}

/// Sample format for a requested or negotiated audio stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    U8,
    S16,
    S32,
    F32,
}

impl Default for SampleFormat {
    fn default() -> Self {
        Self::F32
    }
}

/// Audio format requested by the application; only present when audio was
/// requested at configure time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestedAudioFormat {
    pub sample_format: SampleFormat,
    pub channels: u16,
    pub sample_rate: u32,
}

impl Default for RequestedAudioFormat {
    fn default() -> Self {
        Self {
            sample_format: SampleFormat::F32,
            channels: 2,
            sample_rate: 48_000,
        }
    }
}

/// Format actually negotiated with the platform producer.
///
/// Invariant: once streaming has begun, this does not change without
/// traversing an explicit re-negotiation transition (stop → configure →
/// start).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedVideoFormat {
    pub pixel_format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    /// DRM modifier describing GPU memory layout; only meaningful for
    /// GPU-bound frames on Linux.
    pub drm_modifier: Option<u64>,
}

impl Default for NegotiatedVideoFormat {
    fn default() -> Self {
        Self {
            pixel_format: PixelFormat::Unknown,
            width: 0,
            height: 0,
            frame_rate: FrameRate::default(),
            drm_modifier: None,
        }
    }
}

/// A well-known DRM modifier value meaning "row-major, no tiling".
pub const DRM_FORMAT_MOD_LINEAR: u64 = 0;

/// The DRM modifier sentinel meaning "implicit/vendor-specific, let the
/// producer pick" (`DRM_FORMAT_MOD_INVALID` in `drm_fourcc.h`).
pub const DRM_FORMAT_MOD_INVALID: u64 = 0x00ff_ffff_ffff_ffff;

/// A reasonable `(video, audio)` default pair for a target, per §6.
#[must_use]
pub fn default_formats(have_native_size: bool) -> (RequestedVideoFormat, RequestedAudioFormat) {
    let video = RequestedVideoFormat {
        pixel_format: PixelFormat::Bgra32,
        width: if have_native_size { 0 } else { 1920 },
        height: if have_native_size { 0 } else { 1080 },
        frame_rate: FrameRate::new(30, 1),
        output_preference: OutputPreference::Cpu,
    };
    let audio = RequestedAudioFormat::default();
    (video, audio)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_counts_match_spec_table() {
        assert_eq!(PixelFormat::Unknown.plane_count(), 0);
        assert_eq!(PixelFormat::I420.plane_count(), 3);
        assert_eq!(PixelFormat::Nv12.plane_count(), 2);
        assert_eq!(PixelFormat::Nv21.plane_count(), 2);
        assert_eq!(PixelFormat::Bgra32.plane_count(), 1);
    }

    #[test]
    fn packed_plane_layout_strides() {
        let planes = PixelFormat::Bgra32.plane_layout(1920, 1080);
        assert_eq!(planes.len(), 1);
        assert_eq!(planes[0].stride, 1920 * 4);
        assert_eq!(planes[0].offset, 0);
    }

    #[test]
    fn i420_layout_chroma_half_size() {
        let planes = PixelFormat::I420.plane_layout(1920, 1080);
        assert_eq!(planes.len(), 3);
        assert_eq!(planes[0].stride, 1920);
        assert_eq!((planes[1].width, planes[1].height), (960, 540));
        assert_eq!((planes[2].width, planes[2].height), (960, 540));
        assert!(planes[1].offset > planes[0].offset);
        assert!(planes[2].offset > planes[1].offset);
    }

    #[test]
    fn nv12_layout_two_planes() {
        let planes = PixelFormat::Nv12.plane_layout(1280, 720);
        assert_eq!(planes.len(), 2);
        assert_eq!(planes[0].stride, 1280);
        assert_eq!(planes[1].height, 360);
        assert_eq!(planes[1].offset, 1280 * 720);
    }

    #[test]
    fn unknown_format_falls_back_to_single_plane() {
        let planes = PixelFormat::Unknown.plane_layout(640, 480);
        assert_eq!(planes.len(), 1);
        assert_eq!(planes[0].stride, 640 * 4);
    }

    #[test]
    fn requested_format_defaults_apply_only_to_zero_fields() {
        let req = RequestedVideoFormat {
            pixel_format: PixelFormat::Unknown,
            width: 0,
            height: 0,
            frame_rate: FrameRate::new(0, 0),
            output_preference: OutputPreference::Gpu,
        }
        .with_defaults_applied();
        assert_eq!(req.pixel_format, PixelFormat::Bgra32);
        assert_eq!(req.width, 1920);
        assert_eq!(req.height, 1080);
        assert_eq!(req.frame_rate, FrameRate::new(30, 1));
        assert_eq!(req.output_preference, OutputPreference::Gpu);

        let untouched = RequestedVideoFormat {
            pixel_format: PixelFormat::Nv12,
            width: 640,
            height: 480,
            frame_rate: FrameRate::new(60, 1),
            output_preference: OutputPreference::Cpu,
        }
        .with_defaults_applied();
        assert_eq!(untouched.width, 640);
        assert_eq!(untouched.frame_rate, FrameRate::new(60, 1));
    }

    #[test]
    fn default_formats_native_vs_explicit_size() {
        let (native, _) = default_formats(true);
        assert_eq!((native.width, native.height), (0, 0));
        let (explicit, audio) = default_formats(false);
        assert_eq!((explicit.width, explicit.height), (1920, 1080));
        assert_eq!(audio.sample_rate, 48_000);
        assert_eq!(audio.channels, 2);
    }
}

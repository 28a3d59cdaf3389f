use anyhow::{Context, Result};
use image::RgbImage;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

/// Pixel layouts the camera can hand us.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb3,
    Yuyv,
    Grey,
}

impl PixelFormat {
    pub fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"RGB3" => Some(Self::Rgb3),
            b"YUYV" => Some(Self::Yuyv),
            b"GREY" => Some(Self::Grey),
            _ => None,
        }
    }

    fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb3 => 3,
            Self::Yuyv => 2,
            Self::Grey => 1,
        }
    }
}

pub struct Camera {
    stream: Stream<'static>,
    width: u32,
    height: u32,
    format: PixelFormat,
}

impl Camera {
    pub fn open(device: &str) -> Result<Self> {
        let dev = Device::with_path(device).with_context(|| format!("open camera {device}"))?;
        let current = dev.format().context("get format")?;

        // RGB3 first, then YUYV, then whatever the driver already had.
        let mut chosen = None;
        for fourcc in [b"RGB3", b"YUYV"] {
            let wanted = Format::new(current.width, current.height, FourCC::new(fourcc));
            if let Ok(fmt) = dev.set_format(&wanted) {
                if fmt.fourcc == FourCC::new(fourcc) {
                    chosen = Some(fmt);
                    break;
                }
            }
        }
        let fmt = chosen.unwrap_or(current);
        let format = PixelFormat::from_fourcc(fmt.fourcc)
            .with_context(|| format!("unsupported pixel format {}", fmt.fourcc))?;

        log::info!(
            "camera {device}: {}x{} {:?}",
            fmt.width,
            fmt.height,
            format
        );

        let stream = Stream::with_buffers(&dev, Type::VideoCapture, 4).context("stream")?;
        Ok(Self {
            stream,
            width: fmt.width,
            height: fmt.height,
            format,
        })
    }

    /// Block for the next frame and convert it to RGB.
    pub fn frame(&mut self) -> Result<RgbImage> {
        let (data, meta) = self.stream.next().context("capture frame")?;
        log::debug!("captured frame seq={} len={}", meta.sequence, data.len());
        to_rgb(self.format, self.width, self.height, data)
    }
}

/// Convert one raw frame into an RGB image.
pub fn to_rgb(format: PixelFormat, width: u32, height: u32, data: &[u8]) -> Result<RgbImage> {
    let pixels = (width * height) as usize;
    let expected = pixels * format.bytes_per_pixel();
    if data.len() < expected {
        anyhow::bail!(
            "short {:?} buffer: got {}, expected {}",
            format,
            data.len(),
            expected
        );
    }
    let data = &data[..expected];

    let buf = match format {
        PixelFormat::Rgb3 => data.to_vec(),
        PixelFormat::Grey => data.iter().flat_map(|&y| [y, y, y]).collect(),
        PixelFormat::Yuyv => data
            .chunks_exact(4)
            .flat_map(|c| {
                let u = c[1] as f32 - 128.0;
                let v = c[3] as f32 - 128.0;
                let [r0, g0, b0] = yuv_to_rgb(c[0] as f32, u, v);
                let [r1, g1, b1] = yuv_to_rgb(c[2] as f32, u, v);
                [r0, g0, b0, r1, g1, b1]
            })
            .collect(),
    };

    RgbImage::from_raw(width, height, buf).context("failed to build image buffer")
}

fn yuv_to_rgb(y: f32, u: f32, v: f32) -> [u8; 3] {
    let clamp = |c: f32| c.clamp(0.0, 255.0) as u8;
    [
        clamp(y + 1.402 * v),
        clamp(y - 0.344136 * u - 0.714136 * v),
        clamp(y + 1.772 * u),
    ]
}

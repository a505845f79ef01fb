//! 颜色与 CIE 色度转换
//!
//! 场景模型中颜色统一存为 `#RRGGBB`；交换格式和灯具配置文件使用
//! CIE 1931 `x,y,Y` 字符串（Y 取 0..100）。采用 sRGB / D65 原色。

use crate::input_parser::{InputParser, ParseError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// D65 白点色度
const D65_WHITE: (f64, f64) = (0.3127, 0.3290);

/// 8位 RGB 颜色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb { r: 255, g: 255, b: 255 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// 解析 `#RRGGBB`（`#` 可省略）
    pub fn from_hex(hex: &str) -> Result<Self, ParseError> {
        let digits = hex.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseError::InvalidFormat(format!("Invalid hex color: {}", hex)));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| ParseError::InvalidFormat(format!("Invalid hex color: {}", hex)))
        };
        Ok(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
        })
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// 转为 CIE xyY
    pub fn to_cie(&self) -> CieColor {
        let r = srgb_to_linear(self.r);
        let g = srgb_to_linear(self.g);
        let b = srgb_to_linear(self.b);

        let x = 0.4124564 * r + 0.3575761 * g + 0.1804375 * b;
        let y = 0.2126729 * r + 0.7151522 * g + 0.0721750 * b;
        let z = 0.0193339 * r + 0.1191920 * g + 0.9503041 * b;

        let sum = x + y + z;
        if sum <= f64::EPSILON {
            return CieColor {
                x: D65_WHITE.0,
                y: D65_WHITE.1,
                luminance: 0.0,
            };
        }
        CieColor {
            x: x / sum,
            y: y / sum,
            luminance: y * 100.0,
        }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// CIE 1931 色度 + 亮度
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CieColor {
    pub x: f64,
    pub y: f64,
    /// 0..100
    pub luminance: f64,
}

impl CieColor {
    /// 解析 `x,y,Y`
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let values = text
            .split(',')
            .map(InputParser::parse_number)
            .collect::<Result<Vec<f64>, ParseError>>()?;
        match values.as_slice() {
            [x, y, luminance] => Ok(Self {
                x: *x,
                y: *y,
                luminance: *luminance,
            }),
            _ => Err(ParseError::InvalidFormat(format!("Invalid CIE color: {}", text))),
        }
    }

    pub fn to_rgb(&self) -> Rgb {
        if self.y <= f64::EPSILON {
            return Rgb::new(0, 0, 0);
        }
        let big_y = self.luminance / 100.0;
        let big_x = self.x * big_y / self.y;
        let big_z = (1.0 - self.x - self.y) * big_y / self.y;

        let r = 3.2404542 * big_x - 1.5371385 * big_y - 0.4985314 * big_z;
        let g = -0.9692660 * big_x + 1.8760108 * big_y + 0.0415560 * big_z;
        let b = 0.0556434 * big_x - 0.2040259 * big_y + 1.0572252 * big_z;

        Rgb::new(linear_to_srgb(r), linear_to_srgb(g), linear_to_srgb(b))
    }
}

impl fmt::Display for CieColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6},{:.6}", self.x, self.y, self.luminance)
    }
}

fn srgb_to_linear(channel: u8) -> f64 {
    let c = channel as f64 / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(linear: f64) -> u8 {
    let c = linear.clamp(0.0, 1.0);
    let encoded = if c <= 0.0031308 {
        12.92 * c
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    };
    (encoded * 255.0).round().clamp(0.0, 255.0) as u8
}

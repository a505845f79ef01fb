//! 用户输入与文件文本解析
//!
//! 支持的格式：
//! - DMX地址: `3.1`（宇宙.通道）或绝对地址 `1025`
//! - 数字标识: `101`（仅由数字组成的正整数）
//! - 数值: `12.5`
//!
//! 所有解析都返回显式的 `Result`，调用方决定是降级还是中止。

use std::fmt;
use thiserror::Error;

/// 每个DMX宇宙的通道数
pub const CHANNELS_PER_UNIVERSE: u32 = 512;

/// 解析错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// 无效格式
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
    /// 缺少必需的值
    #[error("Missing value: {0}")]
    MissingValue(String),
    /// 数值超出允许范围
    #[error("Out of range: {0}")]
    OutOfRange(String),
}

/// 最大宇宙号：保证绝对地址不超出 `u32`
pub const MAX_UNIVERSE: u32 = u32::MAX / CHANNELS_PER_UNIVERSE;

/// DMX地址（宇宙 1..=MAX_UNIVERSE，通道 1..=512）
///
/// 只能通过 [`DmxAddress::new`] 或解析得到，因此绝对地址的换算不会溢出。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DmxAddress {
    universe: u32,
    channel: u32,
}

impl DmxAddress {
    pub fn new(universe: u32, channel: u32) -> Result<Self, ParseError> {
        if universe == 0 || universe > MAX_UNIVERSE {
            return Err(ParseError::OutOfRange(format!("universe {}", universe)));
        }
        if channel == 0 || channel > CHANNELS_PER_UNIVERSE {
            return Err(ParseError::OutOfRange(format!("channel {}", channel)));
        }
        Ok(Self { universe, channel })
    }

    pub fn universe(&self) -> u32 {
        self.universe
    }

    pub fn channel(&self) -> u32 {
        self.channel
    }

    /// 绝对地址：`(universe - 1) * 512 + channel`
    pub fn to_absolute(&self) -> u32 {
        (self.universe - 1) * CHANNELS_PER_UNIVERSE + self.channel
    }

    pub fn from_absolute(absolute: u32) -> Result<Self, ParseError> {
        if absolute == 0 {
            return Err(ParseError::OutOfRange("absolute address 0".to_string()));
        }
        let zero_based = absolute - 1;
        Self::new(
            zero_based / CHANNELS_PER_UNIVERSE + 1,
            zero_based % CHANNELS_PER_UNIVERSE + 1,
        )
    }
}

impl fmt::Display for DmxAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.universe, self.channel)
    }
}

/// 输入解析器
pub struct InputParser;

impl InputParser {
    /// 解析DMX地址
    ///
    /// 接受 `宇宙.通道` 与纯数字的绝对地址两种写法。
    pub fn parse_address(input: &str) -> Result<DmxAddress, ParseError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseError::MissingValue("DMX address".to_string()));
        }

        if let Some((universe_str, channel_str)) = input.split_once('.') {
            let universe = universe_str
                .trim()
                .parse::<u32>()
                .map_err(|_| ParseError::InvalidFormat(format!("Invalid universe: {}", universe_str)))?;
            let channel = channel_str
                .trim()
                .parse::<u32>()
                .map_err(|_| ParseError::InvalidFormat(format!("Invalid channel: {}", channel_str)))?;
            return DmxAddress::new(universe, channel);
        }

        let absolute = input
            .parse::<u32>()
            .map_err(|_| ParseError::InvalidFormat(format!("Invalid DMX address: {}", input)))?;
        DmxAddress::from_absolute(absolute)
    }

    /// 解析数字标识：非空、仅含ASCII数字、且为正整数
    pub fn parse_numeric_id(input: &str) -> Result<u32, ParseError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseError::MissingValue("numeric identifier".to_string()));
        }
        if !input.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseError::InvalidFormat(format!("Not purely numeric: {}", input)));
        }
        let value = input
            .parse::<u32>()
            .map_err(|_| ParseError::OutOfRange(format!("Identifier too large: {}", input)))?;
        if value == 0 {
            return Err(ParseError::OutOfRange("identifier must be positive".to_string()));
        }
        Ok(value)
    }

    /// 解析有限浮点数
    pub fn parse_number(input: &str) -> Result<f64, ParseError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseError::MissingValue("number".to_string()));
        }
        let value = input
            .parse::<f64>()
            .map_err(|_| ParseError::InvalidFormat(format!("Invalid number: {}", input)))?;
        if !value.is_finite() {
            return Err(ParseError::OutOfRange(format!("Non-finite number: {}", input)));
        }
        Ok(value)
    }
}

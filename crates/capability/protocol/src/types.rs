//! Modbus 寄存器类型与解码

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Modbus 寄存器数据类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModbusDataType {
    /// 16位有符号整数
    Int16,
    /// 16位无符号整数
    #[default]
    Uint16,
    /// 32位有符号整数（2个寄存器）
    Int32,
    /// 32位无符号整数（2个寄存器）
    Uint32,
    /// 32位浮点数（2个寄存器）
    Float32,
    /// 64位浮点数（4个寄存器）
    Float64,
}

impl ModbusDataType {
    /// 该类型占用的寄存器数量。
    pub fn register_count(&self) -> u16 {
        match self {
            ModbusDataType::Int16 | ModbusDataType::Uint16 => 1,
            ModbusDataType::Int32 | ModbusDataType::Uint32 | ModbusDataType::Float32 => 2,
            ModbusDataType::Float64 => 4,
        }
    }
}

impl FromStr for ModbusDataType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "int16" => Ok(ModbusDataType::Int16),
            "uint16" => Ok(ModbusDataType::Uint16),
            "int32" => Ok(ModbusDataType::Int32),
            "uint32" => Ok(ModbusDataType::Uint32),
            "float32" | "float" => Ok(ModbusDataType::Float32),
            "float64" | "double" => Ok(ModbusDataType::Float64),
            other => Err(format!("unknown modbus data type: {}", other)),
        }
    }
}

/// 寄存器区（对应读功能码 1..=4）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterKind {
    /// 线圈 (0x01)
    Coil,
    /// 离散输入 (0x02)
    Discrete,
    /// 保持寄存器 (0x03)
    #[default]
    Holding,
    /// 输入寄存器 (0x04)
    Input,
}

impl RegisterKind {
    pub fn from_function_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(RegisterKind::Coil),
            2 => Some(RegisterKind::Discrete),
            3 => Some(RegisterKind::Holding),
            4 => Some(RegisterKind::Input),
            _ => None,
        }
    }

    pub fn function_code(&self) -> u8 {
        match self {
            RegisterKind::Coil => 1,
            RegisterKind::Discrete => 2,
            RegisterKind::Holding => 3,
            RegisterKind::Input => 4,
        }
    }

    /// 线圈与离散输入按位读取。
    pub fn is_bit(&self) -> bool {
        matches!(self, RegisterKind::Coil | RegisterKind::Discrete)
    }
}

impl FromStr for RegisterKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "coil" | "coils" => Ok(RegisterKind::Coil),
            "discrete" | "discrete_input" | "discrete_inputs" => Ok(RegisterKind::Discrete),
            "holding" | "holding_register" | "holding_registers" => Ok(RegisterKind::Holding),
            "input" | "input_register" | "input_registers" => Ok(RegisterKind::Input),
            other => Err(format!("unknown register type: {}", other)),
        }
    }
}

/// 多寄存器值的字序
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WordOrder {
    /// 高字在前
    #[default]
    BigEndian,
    /// 低字在前
    LittleEndian,
}

impl FromStr for WordOrder {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "big_endian" | "big" | "abcd" => Ok(WordOrder::BigEndian),
            "little_endian" | "little" | "cdab" => Ok(WordOrder::LittleEndian),
            other => Err(format!("unknown word order: {}", other)),
        }
    }
}

/// 解析寄存器数据为浮点值（未缩放）
pub fn decode_registers(
    registers: &[u16],
    data_type: ModbusDataType,
    word_order: WordOrder,
) -> Result<f64, ProtocolError> {
    let needed = data_type.register_count() as usize;
    if registers.len() < needed {
        return Err(ProtocolError::DataParse(format!(
            "need {} registers for {:?}, got {}",
            needed,
            data_type,
            registers.len()
        )));
    }

    let mut words: Vec<u64> = registers[..needed].iter().map(|r| *r as u64).collect();
    if word_order == WordOrder::LittleEndian {
        words.reverse();
    }
    let bits = words.iter().fold(0u64, |acc, word| (acc << 16) | word);

    let value = match data_type {
        ModbusDataType::Int16 => bits as u16 as i16 as f64,
        ModbusDataType::Uint16 => bits as u16 as f64,
        ModbusDataType::Int32 => bits as u32 as i32 as f64,
        ModbusDataType::Uint32 => bits as u32 as f64,
        ModbusDataType::Float32 => f32::from_bits(bits as u32) as f64,
        ModbusDataType::Float64 => f64::from_bits(bits),
    };

    if !value.is_finite() {
        return Err(ProtocolError::DataParse(format!(
            "non-finite {:?} value",
            data_type
        )));
    }
    Ok(value)
}

/// 工程量换算：raw × scale + offset
pub fn apply_scaling(raw: f64, scale: f64, offset: f64) -> f64 {
    raw * scale + offset
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_int16_sign() {
        let value = decode_registers(&[(-100i16) as u16], ModbusDataType::Int16, WordOrder::BigEndian)
            .unwrap();
        assert_eq!(value, -100.0);
        let value = decode_registers(&[100], ModbusDataType::Int16, WordOrder::BigEndian).unwrap();
        assert_eq!(value, 100.0);
    }

    #[test]
    fn test_decode_uint16_with_scale() {
        let raw = decode_registers(&[1234], ModbusDataType::Uint16, WordOrder::BigEndian).unwrap();
        let scaled = apply_scaling(raw, 0.1, 0.0);
        assert!((scaled - 123.4).abs() < 1e-9);
        // 同一输入重复解码结果一致
        let again = apply_scaling(
            decode_registers(&[1234], ModbusDataType::Uint16, WordOrder::BigEndian).unwrap(),
            0.1,
            0.0,
        );
        assert_eq!(scaled, again);
    }

    #[test]
    fn test_decode_float32_word_order() {
        let bits = 25.5f32.to_bits();
        let high = (bits >> 16) as u16;
        let low = (bits & 0xFFFF) as u16;
        let big = decode_registers(&[high, low], ModbusDataType::Float32, WordOrder::BigEndian)
            .unwrap();
        let little =
            decode_registers(&[low, high], ModbusDataType::Float32, WordOrder::LittleEndian)
                .unwrap();
        assert_eq!(big, 25.5);
        assert_eq!(little, 25.5);
    }

    #[test]
    fn test_decode_int32_and_float64() {
        let value = -70000i32 as u32;
        let regs = [(value >> 16) as u16, (value & 0xFFFF) as u16];
        assert_eq!(
            decode_registers(&regs, ModbusDataType::Int32, WordOrder::BigEndian).unwrap(),
            -70000.0
        );

        let bits = 1234.5678f64.to_bits();
        let regs = [
            (bits >> 48) as u16,
            (bits >> 32) as u16,
            (bits >> 16) as u16,
            bits as u16,
        ];
        assert_eq!(
            decode_registers(&regs, ModbusDataType::Float64, WordOrder::BigEndian).unwrap(),
            1234.5678
        );
    }

    #[test]
    fn test_decode_short_input_fails() {
        let err = decode_registers(&[1], ModbusDataType::Uint32, WordOrder::BigEndian).unwrap_err();
        assert!(matches!(err, ProtocolError::DataParse(_)));
    }

    #[test]
    fn test_register_kind_from_function_code() {
        assert_eq!(RegisterKind::from_function_code(4), Some(RegisterKind::Input));
        assert_eq!(RegisterKind::from_function_code(6), None);
        assert!(RegisterKind::Coil.is_bit());
        assert_eq!("holding".parse::<RegisterKind>().unwrap().function_code(), 3);
    }
}

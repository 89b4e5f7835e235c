use crate::{
    Result,
    constants::{
        DEFAULT_BAUD_RATE, FRAME_DELIMITER, FRAME_RESERVED_A, FRAME_RESERVED_B, FRAME_TERMINATOR,
    },
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Stable identity of a physical USB device.
///
/// The key is whatever the host uses to tell two attachments apart, usually
/// the device node path (`/dev/ttyACM0`, `COM4`). Attach and detach events
/// carry it so a detach can be matched against the open connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceKey(String);

impl DeviceKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// A USB device as reported by the host.
///
/// Two `UsbDevice` values are equal when their [`DeviceKey`]s are equal;
/// descriptor strings are informational and do not take part in identity.
///
/// # Examples
///
/// ```
/// use usbtelem_core::UsbDevice;
///
/// let attached = UsbDevice::new("/dev/ttyACM0", 0x0483, 0x5740).with_product("Flight Controller");
/// let detached = UsbDevice::new("/dev/ttyACM0", 0x0483, 0x5740);
/// assert_eq!(attached, detached);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsbDevice {
    /// Identity used to match attach/detach events.
    pub key: DeviceKey,

    /// USB vendor id.
    pub vendor_id: u16,

    /// USB product id.
    pub product_id: u16,

    /// Optional serial number descriptor.
    pub serial_number: Option<String>,

    /// Optional manufacturer descriptor.
    pub manufacturer: Option<String>,

    /// Optional product descriptor.
    pub product: Option<String>,
}

impl UsbDevice {
    /// Create a device with the required identity fields.
    pub fn new(key: impl Into<String>, vendor_id: u16, product_id: u16) -> Self {
        Self {
            key: DeviceKey::new(key),
            vendor_id,
            product_id,
            serial_number: None,
            manufacturer: None,
            product: None,
        }
    }

    /// Set the serial number.
    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }

    /// Set the manufacturer string.
    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    /// Set the product string.
    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = Some(product.into());
        self
    }

    /// Whether `other` is the same physical adapter: same vendor, product
    /// and serial number. Unlike `==`, the key is not compared.
    pub fn same_hardware(&self, other: &UsbDevice) -> bool {
        self.vendor_id == other.vendor_id
            && self.product_id == other.product_id
            && self.serial_number == other.serial_number
    }

    /// Vendor and product id as the usual `vvvv:pppp` hex pair.
    #[must_use]
    pub fn usb_id(&self) -> String {
        format!("{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

impl PartialEq for UsbDevice {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for UsbDevice {}

impl Hash for UsbDevice {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for UsbDevice {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} [{}]", self.key, self.usb_id())?;
        if let Some(product) = &self.product {
            write!(f, " {product}")?;
        }
        Ok(())
    }
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl TryFrom<u8> for DataBits {
    type Error = Error;

    fn try_from(bits: u8) -> Result<Self> {
        match bits {
            5 => Ok(Self::Five),
            6 => Ok(Self::Six),
            7 => Ok(Self::Seven),
            8 => Ok(Self::Eight),
            other => Err(Error::Config(format!("Data bits must be 5-8, got {other}"))),
        }
    }
}

impl From<DataBits> for u8 {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }
}

/// Number of stop bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum StopBits {
    One,
    Two,
}

impl TryFrom<u8> for StopBits {
    type Error = Error;

    fn try_from(bits: u8) -> Result<Self> {
        match bits {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            other => Err(Error::Config(format!("Stop bits must be 1 or 2, got {other}"))),
        }
    }
}

impl From<StopBits> for u8 {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => 1,
            StopBits::Two => 2,
        }
    }
}

/// Parity checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    None,
    Odd,
    Even,
}

impl Parity {
    fn letter(self) -> char {
        match self {
            Self::None => 'N',
            Self::Odd => 'O',
            Self::Even => 'E',
        }
    }
}

/// Physical framing of the serial link.
///
/// The link always runs at [`LineConfig::DEFAULT`] (115200 8N1); the type
/// exists so backends receive one value instead of four loose parameters.
///
/// # Examples
///
/// ```
/// use usbtelem_core::LineConfig;
///
/// assert_eq!(LineConfig::DEFAULT.to_string(), "115200 8N1");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineConfig {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
}

impl LineConfig {
    pub const DEFAULT: LineConfig = LineConfig {
        baud_rate: DEFAULT_BAUD_RATE,
        data_bits: DataBits::Eight,
        stop_bits: StopBits::One,
        parity: Parity::None,
    };
}

impl Default for LineConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for LineConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {}{}{}",
            self.baud_rate,
            u8::from(self.data_bits),
            self.parity.letter(),
            u8::from(self.stop_bits)
        )
    }
}

/// One telemetry line as written to the serial port.
///
/// Only the quality is variable; the two reserved fields are fixed.
///
/// # Examples
///
/// ```
/// use usbtelem_core::TelemetryFrame;
///
/// let frame = TelemetryFrame::new(7);
/// assert_eq!(frame.to_string(), "/7/233/199/\r\n");
///
/// let parsed: TelemetryFrame = "/-12/233/199/\r\n".parse().unwrap();
/// assert_eq!(parsed.quality(), -12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TelemetryFrame {
    quality: i32,
}

impl TelemetryFrame {
    #[must_use]
    pub fn new(quality: i32) -> Self {
        Self { quality }
    }

    #[must_use]
    pub fn quality(&self) -> i32 {
        self.quality
    }

    /// Encode the frame as the ASCII bytes sent on the wire.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for TelemetryFrame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let d = FRAME_DELIMITER;
        write!(
            f,
            "{d}{}{d}{FRAME_RESERVED_A}{d}{FRAME_RESERVED_B}{d}{FRAME_TERMINATOR}",
            self.quality
        )
    }
}

impl std::str::FromStr for TelemetryFrame {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let body = s
            .strip_suffix(FRAME_TERMINATOR)
            .ok_or_else(|| Error::InvalidFrame("missing line terminator".to_string()))?;
        let body = body
            .strip_prefix(FRAME_DELIMITER)
            .and_then(|b| b.strip_suffix(FRAME_DELIMITER))
            .ok_or_else(|| Error::InvalidFrame(format!("missing delimiters in {body:?}")))?;

        let fields: Vec<&str> = body.split(FRAME_DELIMITER).collect();
        let [quality, reserved_a, reserved_b] = fields.as_slice() else {
            return Err(Error::InvalidFrame(format!(
                "expected 3 fields, got {}",
                fields.len()
            )));
        };

        let quality: i32 = quality
            .parse()
            .map_err(|_| Error::InvalidFrame(format!("quality is not an integer: {quality}")))?;

        if *reserved_a != FRAME_RESERVED_A.to_string() || *reserved_b != FRAME_RESERVED_B.to_string()
        {
            return Err(Error::InvalidFrame(format!(
                "unexpected reserved fields {reserved_a}/{reserved_b}"
            )));
        }

        Ok(Self::new(quality))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashSet;

    #[rstest]
    #[case(7, "/7/233/199/\r\n")]
    #[case(42, "/42/233/199/\r\n")]
    #[case(0, "/0/233/199/\r\n")]
    #[case(-1024, "/-1024/233/199/\r\n")]
    fn test_frame_format(#[case] quality: i32, #[case] expected: &str) {
        let frame = TelemetryFrame::new(quality);
        assert_eq!(frame.to_string(), expected);
        assert_eq!(frame.to_bytes(), expected.as_bytes());
    }

    #[rstest]
    #[case("/7/233/199/")] // no terminator
    #[case("7/233/199/\r\n")] // no leading delimiter
    #[case("/7/233/\r\n")] // missing field
    #[case("/x/233/199/\r\n")] // non-numeric quality
    #[case("/7/1/2/\r\n")] // wrong reserved fields
    fn test_frame_parse_invalid(#[case] input: &str) {
        let result: Result<TelemetryFrame> = input.parse();
        assert!(matches!(result, Err(Error::InvalidFrame(_))));
    }

    #[test]
    fn test_device_identity_uses_key_only() {
        let a = UsbDevice::new("/dev/ttyACM0", 0x0483, 0x5740).with_serial_number("A1");
        let b = UsbDevice::new("/dev/ttyACM0", 0x1209, 0x0001);
        let c = UsbDevice::new("/dev/ttyACM1", 0x0483, 0x5740).with_serial_number("A1");

        assert_eq!(a, b);
        assert_ne!(a, c);

        assert!(!a.same_hardware(&b));
        assert!(a.same_hardware(&c));
        assert!(!a.same_hardware(&a.clone().with_serial_number("B2")));

        let set: HashSet<UsbDevice> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_device_display() {
        let device = UsbDevice::new("/dev/ttyUSB0", 0x10c4, 0xea60).with_product("CP2102");
        assert_eq!(device.to_string(), "/dev/ttyUSB0 [10c4:ea60] CP2102");
    }

    #[test]
    fn test_line_config_default() {
        let config = LineConfig::default();
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.data_bits, DataBits::Eight);
        assert_eq!(config.stop_bits, StopBits::One);
        assert_eq!(config.parity, Parity::None);
        assert_eq!(config.to_string(), "115200 8N1");
    }

    #[test]
    fn test_line_config_serde() {
        let json = serde_json::to_string(&LineConfig::DEFAULT).unwrap();
        assert_eq!(
            json,
            r#"{"baud_rate":115200,"data_bits":8,"stop_bits":1,"parity":"none"}"#
        );

        let bad = r#"{"baud_rate":9600,"data_bits":9,"stop_bits":1,"parity":"none"}"#;
        assert!(serde_json::from_str::<LineConfig>(bad).is_err());
    }
}

//! System status register.

use std::fmt;

/// Status byte carried in every reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemStatus(u8);

impl SystemStatus {
    /// The previous command completed successfully.
    pub const LAST_CMD_OK: u8 = 1 << 0;
    /// Payloads are waiting in the transmit queue.
    pub const TX_BUSY: u8 = 1 << 1;
    /// Active settings differ from the saved ones.
    pub const CONFIG_DIRTY: u8 = 1 << 2;
    /// A received frame was dropped since the last reply.
    pub const RX_OVERRUN: u8 = 1 << 3;

    pub fn new() -> Self {
        Self(0)
    }

    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, flag: u8) -> bool {
        self.0 & flag == flag
    }

    pub fn set(&mut self, flag: u8) {
        self.0 |= flag;
    }

    pub fn clear(&mut self, flag: u8) {
        self.0 &= !flag;
    }

    /// Sets or clears `flag`.
    pub fn assign(&mut self, flag: u8, on: bool) {
        if on {
            self.set(flag);
        } else {
            self.clear(flag);
        }
    }
}

impl fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::LAST_CMD_OK, "OK"),
            (Self::TX_BUSY, "TX_BUSY"),
            (Self::CONFIG_DIRTY, "DIRTY"),
            (Self::RX_OVERRUN, "RX_OVERRUN"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if set.is_empty() {
            write!(f, "{:#04x}", self.0)
        } else {
            write!(f, "{:#04x} ({})", self.0, set.join("|"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_clear() {
        let mut status = SystemStatus::new();
        assert_eq!(status.bits(), 0);

        status.set(SystemStatus::TX_BUSY);
        status.set(SystemStatus::LAST_CMD_OK);
        assert_eq!(status.bits(), 0x03);
        assert!(status.contains(SystemStatus::TX_BUSY));

        status.clear(SystemStatus::TX_BUSY);
        assert!(!status.contains(SystemStatus::TX_BUSY));
        assert!(status.contains(SystemStatus::LAST_CMD_OK));
    }

    #[test]
    fn test_assign() {
        let mut status = SystemStatus::from_bits(0x0F);
        status.assign(SystemStatus::CONFIG_DIRTY, false);
        assert_eq!(status.bits(), 0x0B);
        status.assign(SystemStatus::CONFIG_DIRTY, true);
        assert_eq!(status.bits(), 0x0F);
    }

    #[test]
    fn test_display() {
        assert_eq!(SystemStatus::new().to_string(), "0x00");
        let status = SystemStatus::from_bits(SystemStatus::LAST_CMD_OK | SystemStatus::RX_OVERRUN);
        assert_eq!(status.to_string(), "0x09 (OK|RX_OVERRUN)");
    }
}

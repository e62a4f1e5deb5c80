//! Frame identifiers
//!
//! DCCNET is an alternating-bit protocol: data and ACK frames carry id 0 or 1,
//! and the id toggles once per acknowledged (sender) or delivered (receiver)
//! frame. The 16-bit field has one more reserved value, `0xFFFF`, used by
//! RESET frames.

use std::fmt;

/// Id carried by RESET frames.
pub const RESET_ID: u16 = 0xFFFF;

/// 16-bit frame id as it appears on the wire
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Default)]
pub struct FrameId(u16);

impl FrameId {
    /// First id of every connection
    pub const ZERO: FrameId = FrameId(0);
    /// The other half of the alternation
    pub const ONE: FrameId = FrameId(1);
    /// Reserved id for RESET frames
    pub const RESET: FrameId = FrameId(RESET_ID);

    /// Wrap a raw wire value. Any value is accepted; only 0 and 1 take part
    /// in the alternation.
    #[inline]
    pub const fn from_raw(value: u16) -> Self {
        FrameId(value)
    }

    /// Get the raw wire value
    #[inline]
    pub const fn as_raw(self) -> u16 {
        self.0
    }

    /// Whether this id is one of the two alternating values
    #[inline]
    pub fn is_alternating(self) -> bool {
        self.0 <= 1
    }

    /// The other alternating id.
    ///
    /// Only meaningful for 0 and 1; any other value is returned unchanged.
    #[inline]
    pub fn toggled(self) -> Self {
        if self.is_alternating() {
            FrameId(self.0 ^ 1)
        } else {
            self
        }
    }

    /// Toggle in place
    #[inline]
    pub fn toggle(&mut self) {
        *self = self.toggled();
    }
}

impl fmt::Debug for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameId({:#06x})", self.0)
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for FrameId {
    fn from(value: u16) -> Self {
        FrameId::from_raw(value)
    }
}

impl From<FrameId> for u16 {
    fn from(id: FrameId) -> u16 {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alternation() {
        let mut id = FrameId::ZERO;
        let mut seen = Vec::new();
        for _ in 0..6 {
            seen.push(id.as_raw());
            id.toggle();
        }
        assert_eq!(seen, vec![0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn test_reset_id_does_not_toggle() {
        assert!(!FrameId::RESET.is_alternating());
        assert_eq!(FrameId::RESET.toggled(), FrameId::RESET);
        assert_eq!(FrameId::from_raw(7).toggled(), FrameId::from_raw(7));
    }

    #[test]
    fn test_conversions() {
        let id: FrameId = 1u16.into();
        assert_eq!(id, FrameId::ONE);
        assert_eq!(u16::from(FrameId::RESET), 0xFFFF);
        assert_eq!(format!("{}", FrameId::ONE), "1");
        assert_eq!(format!("{:?}", FrameId::RESET), "FrameId(0xffff)");
    }
}

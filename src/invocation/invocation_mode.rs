/// Call mode tag of an invocation. One invocation type is parameterized
/// by this tag; mode-specific behavior (reply decoding, batch append,
/// done-at-send) is selected from it rather than from a type hierarchy.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CallMode {
    Twoway = 0,
    Oneway = 1,
    Datagram = 2,
    BatchOneway = 3,
    BatchDatagram = 4,
}

impl CallMode {
    #[inline]
    pub fn value(self) -> u8 {
        self as u8
    }

    /// Batch modes append to a shared buffer instead of sending.
    #[inline]
    pub fn is_batch(self) -> bool {
        matches!(self, CallMode::BatchOneway | CallMode::BatchDatagram)
    }

    /// Only twoway calls wait for a reply envelope; for every other mode
    /// "sent" and "done" coincide.
    #[inline]
    pub fn expects_reply(self) -> bool {
        matches!(self, CallMode::Twoway)
    }
}

impl TryFrom<u8> for CallMode {
    type Error = ();

    fn try_from(v: u8) -> Result<Self, ()> {
        match v {
            0 => Ok(CallMode::Twoway),
            1 => Ok(CallMode::Oneway),
            2 => Ok(CallMode::Datagram),
            3 => Ok(CallMode::BatchOneway),
            4 => Ok(CallMode::BatchDatagram),
            _ => Err(()),
        }
    }
}

//! Layer access control payload.

use crate::error::{DecodeError, EncodeError};
use crate::reader::PayloadReader;
use crate::writer::PayloadWriter;

/// Set the lock state, access tier and exclusive user list of a layer.
///
/// Wire layout: `id(2) | flags(1) | exclusive(remainder, at most 255 ids)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerAclMessage {
    pub id: u16,
    /// [`Self::FLAGS_LOCKED`] plus the access tier in the low bits.
    pub flags: u8,
    /// Users allowed to draw on the layer. Empty means everyone with the tier.
    pub exclusive: Vec<u8>,
}

impl LayerAclMessage {
    pub const FLAGS_LOCKED: u8 = 0x80;
    pub const TIER_MASK: u8 = 0x07;

    pub(crate) fn deserialize(r: &mut PayloadReader) -> Result<Self, DecodeError> {
        r.validate("LayerAcl", 3, 3 + u8::MAX as usize)?;

        let id = r.read_u16()?;
        let flags = r.read_u8()?;
        let exclusive = r.read_remaining().to_vec();

        Ok(Self { id, flags, exclusive })
    }

    pub(crate) fn check(&self) -> Result<(), EncodeError> {
        if self.exclusive.len() > u8::MAX as usize {
            return Err(EncodeError::InvalidField("LayerAcl::exclusive exceeds 255 users"));
        }
        Ok(())
    }

    pub(crate) fn serialize(&self, w: &mut PayloadWriter) {
        w.u16(self.id).u8(self.flags).bytes(&self.exclusive);
    }

    pub(crate) fn payload_len(&self) -> usize {
        3 + self.exclusive.len()
    }

    pub fn locked(&self) -> bool {
        self.flags & Self::FLAGS_LOCKED != 0
    }

    pub fn tier(&self) -> u8 {
        self.flags & Self::TIER_MASK
    }
}

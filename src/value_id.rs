// Copyright (c) 2024-present, ad-freiburg/qlever
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The 64-bit tagged [`ValueId`] and its distinguished `UNDEF` value.
//!
//! The top byte of the word holds the [`Datatype`] discriminant, the
//! remaining 56 bits hold the payload. Ordering is lexicographic on
//! `(Datatype, payload)`, with [`Datatype::Undefined`] sorting first so that
//! `UNDEF` values naturally group at the front of a sorted join column.

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

const PAYLOAD_BITS: u32 = 56;
const PAYLOAD_MASK: u64 = (1 << PAYLOAD_BITS) - 1;

/// Discriminant tag occupying the top byte of a [`ValueId`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Datatype {
    /// The distinguished "unbound" value.
    Undefined = 0,
    /// A signed integer payload.
    Int = 1,
    /// An IEEE-754 double, bit-packed into the payload.
    Double = 2,
    /// A boolean.
    Bool = 3,
    /// Index into the global vocabulary (string dictionary).
    VocabIndex = 4,
    /// Index into a per-operation [`crate::local_vocab::LocalVocab`].
    LocalVocabIndex = 5,
    /// Index into the full-text record index.
    TextRecordIndex = 6,
    /// Days since an epoch, used for xsd:date / xsd:dateTime literals.
    Date = 7,
}

impl Datatype {
    fn from_tag(tag: u8) -> Result<Self, DecodeError> {
        match tag {
            0 => Ok(Self::Undefined),
            1 => Ok(Self::Int),
            2 => Ok(Self::Double),
            3 => Ok(Self::Bool),
            4 => Ok(Self::VocabIndex),
            5 => Ok(Self::LocalVocabIndex),
            6 => Ok(Self::TextRecordIndex),
            7 => Ok(Self::Date),
            other => Err(DecodeError::InvalidTag("Datatype", other)),
        }
    }
}

/// A 64-bit tagged identifier of a value in a result row.
///
/// Bitwise equality defines [`ValueId`] equality, except that `UNDEF`
/// compares equal to itself but is *compatible* with every other value (see
/// [`ValueId::is_compatible_with`]). IDs have a total order used to sort
/// join columns; `isUndefined` is a constant-time predicate.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct ValueId {
    datatype: Datatype,
    payload: u64,
}

impl ValueId {
    /// The distinguished "unbound" value.
    pub const UNDEF: Self = Self {
        datatype: Datatype::Undefined,
        payload: 0,
    };

    fn new(datatype: Datatype, payload: u64) -> Self {
        debug_assert!(payload & !PAYLOAD_MASK == 0, "payload overflows 56 bits");
        Self {
            datatype,
            payload: payload & PAYLOAD_MASK,
        }
    }

    /// Builds the distinguished UNDEF value.
    #[must_use]
    pub const fn make_undefined() -> Self {
        Self::UNDEF
    }

    /// Builds a `ValueId` wrapping a signed integer.
    ///
    /// # Panics
    ///
    /// Panics if `value` does not fit into 56 bits (two's complement).
    #[must_use]
    pub fn make_int(value: i64) -> Self {
        assert!(
            (-(1i64 << (PAYLOAD_BITS - 1))..(1i64 << (PAYLOAD_BITS - 1))).contains(&value),
            "integer does not fit into a 56-bit ValueId payload"
        );
        Self::new(Datatype::Int, (value as u64) & PAYLOAD_MASK)
    }

    /// Reads back a [`ValueId::make_int`] payload, sign-extending it.
    ///
    /// # Panics
    ///
    /// Panics if `self` is not of datatype [`Datatype::Int`].
    #[must_use]
    pub fn as_int(self) -> i64 {
        assert_eq!(self.datatype, Datatype::Int);
        let sign_bit = 1u64 << (PAYLOAD_BITS - 1);
        if self.payload & sign_bit == 0 {
            self.payload as i64
        } else {
            (self.payload | !PAYLOAD_MASK) as i64
        }
    }

    /// Builds a `ValueId` wrapping a double, truncated to 56 bits of
    /// mantissa+exponent (sufficient precision for join comparisons; the
    /// expression engine that produces these values is out of scope here).
    #[must_use]
    pub fn make_double(value: f64) -> Self {
        let bits = value.to_bits() >> (64 - PAYLOAD_BITS);
        Self::new(Datatype::Double, bits)
    }

    /// Builds a boolean `ValueId`.
    #[must_use]
    pub fn make_bool(value: bool) -> Self {
        Self::new(Datatype::Bool, u64::from(value))
    }

    /// Builds a `ValueId` referencing an entry in the global vocabulary.
    #[must_use]
    pub fn make_vocab_index(index: u64) -> Self {
        Self::new(Datatype::VocabIndex, index)
    }

    /// Builds a `ValueId` referencing an entry in a [`crate::local_vocab::LocalVocab`].
    #[must_use]
    pub fn make_local_vocab_index(index: u64) -> Self {
        Self::new(Datatype::LocalVocabIndex, index)
    }

    /// Builds a `ValueId` referencing an entry in the text record index.
    #[must_use]
    pub fn make_text_record_index(index: u64) -> Self {
        Self::new(Datatype::TextRecordIndex, index)
    }

    /// Builds a date `ValueId` from a day count.
    #[must_use]
    pub fn make_date(days: u64) -> Self {
        Self::new(Datatype::Date, days)
    }

    /// Returns the datatype tag.
    #[must_use]
    pub fn datatype(self) -> Datatype {
        self.datatype
    }

    /// Returns the raw 56-bit payload, unsigned.
    #[must_use]
    pub fn raw_payload(self) -> u64 {
        self.payload
    }

    /// Constant-time predicate: is this the distinguished UNDEF value?
    #[must_use]
    pub fn is_undefined(self) -> bool {
        self.datatype == Datatype::Undefined
    }

    /// Two values are compatible if they are bitwise equal, or at least one
    /// of them is UNDEF. This is the SPARQL OPTIONAL-join compatibility
    /// relation.
    #[must_use]
    pub fn is_compatible_with(self, other: Self) -> bool {
        self.is_undefined() || other.is_undefined() || self == other
    }

    /// Returns the non-UNDEF of `self`/`other`, assuming they are
    /// compatible. If both are defined, `self` is returned (callers only
    /// invoke this once compatibility - and hence either equality or one
    /// side being UNDEF - has already been established).
    #[must_use]
    pub fn merge_compatible(self, other: Self) -> Self {
        if self.is_undefined() {
            other
        } else {
            self
        }
    }
}

impl std::fmt::Debug for ValueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_undefined() {
            write!(f, "UNDEF")
        } else {
            write!(f, "{:?}({})", self.datatype, self.payload)
        }
    }
}

impl PartialOrd for ValueId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ValueId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.datatype, self.payload).cmp(&(other.datatype, other.payload))
    }
}

impl Encode for ValueId {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        let word = ((self.datatype as u64) << PAYLOAD_BITS) | self.payload;
        writer.write_u64::<BigEndian>(word)?;
        Ok(())
    }
}

impl Decode for ValueId {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let word = reader.read_u64::<BigEndian>()?;
        let tag = (word >> PAYLOAD_BITS) as u8;
        let datatype = Datatype::from_tag(tag)?;
        let payload = word & PAYLOAD_MASK;
        Ok(Self { datatype, payload })
    }
}

/// Returns `true` if every column of `left` is compatible with the
/// corresponding column of `right`. Both rows must have the
/// same length.
#[must_use]
pub fn rows_compatible(left: &[ValueId], right: &[ValueId]) -> bool {
    debug_assert_eq!(left.len(), right.len());
    left.iter()
        .zip(right)
        .all(|(a, b)| a.is_compatible_with(*b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn undef_is_compatible_with_everything() {
        let a = ValueId::UNDEF;
        let b = ValueId::make_int(42);
        assert!(a.is_compatible_with(b));
        assert!(b.is_compatible_with(a));
        assert!(a.is_compatible_with(a));
    }

    #[test]
    fn distinct_defined_values_are_incompatible() {
        let a = ValueId::make_int(1);
        let b = ValueId::make_int(2);
        assert!(!a.is_compatible_with(b));
    }

    #[test]
    fn undef_sorts_first() {
        let mut ids = vec![ValueId::make_int(5), ValueId::UNDEF, ValueId::make_int(-5)];
        ids.sort();
        assert!(ids[0].is_undefined());
    }

    #[test]
    fn int_round_trips_negative_values() {
        for v in [-1_i64, 0, 1, i64::from(i32::MIN), i64::from(i32::MAX)] {
            assert_eq!(ValueId::make_int(v).as_int(), v);
        }
    }

    #[test]
    fn encode_decode_round_trip() {
        let ids = [
            ValueId::UNDEF,
            ValueId::make_int(-123),
            ValueId::make_bool(true),
            ValueId::make_vocab_index(999),
        ];
        for id in ids {
            let bytes = id.encode_into_vec();
            let mut cursor = std::io::Cursor::new(bytes);
            let decoded = ValueId::decode_from(&mut cursor).unwrap();
            assert_eq!(id, decoded);
        }
    }

    #[test]
    fn merge_compatible_prefers_defined_side() {
        let defined = ValueId::make_int(7);
        assert_eq!(ValueId::UNDEF.merge_compatible(defined), defined);
        assert_eq!(defined.merge_compatible(ValueId::UNDEF), defined);
    }

    #[test]
    fn rows_compatible_checks_every_column() {
        let l = [ValueId::make_int(1), ValueId::UNDEF];
        let r = [ValueId::make_int(1), ValueId::make_int(2)];
        assert!(rows_compatible(&l, &r));

        let r2 = [ValueId::make_int(2), ValueId::make_int(2)];
        assert!(!rows_compatible(&l, &r2));
    }
}

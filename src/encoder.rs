//! Delta + run-length byte encoding of one section's departures.
//!
//! Byte format, read left to right until the terminator:
//!
//! | Bytes                 | Meaning                                              |
//! |-----------------------|------------------------------------------------------|
//! | `0000.0000`           | end of section                                       |
//! | `0nnn.nnnn`           | `n > 0`: next departure `n` minutes later            |
//! | `1000.0000`           | add 128 minutes to the next single value             |
//! | `1xxx.xxxx nnnn.nnnn` | `x > 0`: `x` departures, each `n` minutes apart      |
//!
//! The first value counts from 04:00 of the operating day. Every later
//! value counts from the previous departure, modulo one day.

use itertools::Itertools;
use std::iter;

use crate::timetable::DepartureTime;

/// Minute of day the first delta counts from (04:00).
pub const ANCHOR_MINUTES: u32 = 4 * 60;
pub const DAY_MINUTES: u32 = 24 * 60;

pub const TERMINATOR: u8 = 0x00;
pub const CONTINUATION: u8 = 0x80;
/// Minutes a single [`CONTINUATION`] byte adds to the value after it.
pub const CONTINUATION_STEP: u32 = 128;

const RUN_FLAG: u8 = 0x80;
const COUNT_MASK: u8 = 0x7F;
const MAX_LITERAL: u32 = 127;
const MAX_RUN_PAYLOAD: u32 = 255;
const MAX_RUN_COUNT: usize = 127;
/// Runs up to this length are written out value by value.
const SHORT_RUN: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("first departure {time} is before the 04:00 anchor")]
    BeforeAnchor { time: DepartureTime },

    #[error(
        "departure #{index}: a gap of {delta} minutes would encode to a 0x00 byte before the terminator"
    )]
    ZeroPayload { index: usize, delta: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("missing 0x00 terminator")]
    MissingTerminator,

    #[error("{count} byte(s) after the terminator at offset {offset}")]
    TrailingBytes { offset: usize, count: usize },

    #[error("run control byte at offset {offset} has no payload")]
    TruncatedRun { offset: usize },

    #[error("continuation before run control byte at offset {offset}")]
    ContinuationBeforeRun { offset: usize },

    #[error("continuation before terminator at offset {offset}")]
    DanglingContinuation { offset: usize },

    #[error("value at offset {offset} overflows 32 bits")]
    ValueOverflow { offset: usize },

    #[error("departure #{index} lies beyond the 32-bit minute range")]
    ClockOverflow { index: usize },
}

/// Minutes between consecutive departures, the first one measured from
/// [`ANCHOR_MINUTES`].
///
/// # Errors
///
/// [`EncodeError::BeforeAnchor`] if the first departure is earlier than 04:00.
pub fn deltas(departures: &[DepartureTime]) -> Result<Vec<u32>, EncodeError> {
    let Some(first) = departures.first() else {
        return Ok(Vec::new());
    };
    let lead = first
        .minute_of_day()
        .checked_sub(ANCHOR_MINUTES)
        .ok_or(EncodeError::BeforeAnchor { time: *first })?;

    let rest = departures.iter().tuple_windows().map(|(previous, next)| {
        (i64::from(next.minute_of_day()) - i64::from(previous.minute_of_day()))
            .rem_euclid(i64::from(DAY_MINUTES)) as u32
    });

    Ok(iter::once(lead).chain(rest).collect())
}

/// Encodes one section into its terminated byte string.
///
/// # Errors
///
/// Fails when the first departure precedes the anchor or when a gap would
/// produce a `0x00` byte inside the data.
pub fn encode_section(departures: &[DepartureTime]) -> Result<Vec<u8>, EncodeError> {
    encode_deltas(&deltas(departures)?)
}

/// Encodes an already computed delta sequence.
pub fn encode_deltas(deltas: &[u32]) -> Result<Vec<u8>, EncodeError> {
    let mut out = Vec::with_capacity(deltas.len() + 1);
    let mut index = 0;

    for (count, value) in deltas.iter().copied().dedup_with_count() {
        encode_run(&mut out, value, count, index)?;
        index += count;
    }

    out.push(TERMINATOR);
    Ok(out)
}

fn encode_run(
    out: &mut Vec<u8>,
    value: u32,
    count: usize,
    index: usize,
) -> Result<(), EncodeError> {
    let zero_payload = Err(EncodeError::ZeroPayload {
        index,
        delta: value,
    });

    if value > MAX_RUN_PAYLOAD || (count <= SHORT_RUN && value > MAX_LITERAL) {
        let payload = (value % CONTINUATION_STEP) as u8;
        if payload == TERMINATOR {
            return zero_payload;
        }
        let continuations = (value / CONTINUATION_STEP) as usize;
        for _ in 0..count {
            out.extend(iter::repeat_n(CONTINUATION, continuations));
            out.push(payload);
        }
        return Ok(());
    }

    if value == 0 {
        return zero_payload;
    }
    let payload = value as u8;

    if count <= SHORT_RUN {
        out.extend(iter::repeat_n(payload, count));
        return Ok(());
    }

    let mut remaining = count;
    while remaining > MAX_RUN_COUNT {
        out.push(RUN_FLAG | COUNT_MASK);
        out.push(payload);
        remaining -= MAX_RUN_COUNT;
    }
    out.push(RUN_FLAG | remaining as u8);
    out.push(payload);
    Ok(())
}

/// Reference decoder for the byte format. Returns the delta sequence.
///
/// # Errors
///
/// Returns a [`DecodeError`] for any byte string the encoder cannot produce.
pub fn decode_section(bytes: &[u8]) -> Result<Vec<u32>, DecodeError> {
    let mut deltas = Vec::new();
    let mut carry: u32 = 0;
    let mut pending_since = 0;
    let mut cursor = bytes.iter().copied().enumerate();

    while let Some((offset, byte)) = cursor.next() {
        match byte {
            TERMINATOR => {
                if carry != 0 {
                    return Err(DecodeError::DanglingContinuation {
                        offset: pending_since,
                    });
                }
                let count = bytes.len() - offset - 1;
                if count > 0 {
                    return Err(DecodeError::TrailingBytes { offset, count });
                }
                return Ok(deltas);
            }
            CONTINUATION => {
                if carry == 0 {
                    pending_since = offset;
                }
                carry = carry
                    .checked_add(CONTINUATION_STEP)
                    .ok_or(DecodeError::ValueOverflow { offset })?;
            }
            control if control & RUN_FLAG != 0 => {
                if carry != 0 {
                    return Err(DecodeError::ContinuationBeforeRun { offset });
                }
                let (_, payload) = cursor
                    .next()
                    .ok_or(DecodeError::TruncatedRun { offset })?;
                let count = usize::from(control & COUNT_MASK);
                deltas.extend(iter::repeat_n(u32::from(payload), count));
            }
            literal => {
                let value = carry
                    .checked_add(u32::from(literal))
                    .ok_or(DecodeError::ValueOverflow { offset })?;
                deltas.push(value);
                carry = 0;
            }
        }
    }

    Err(DecodeError::MissingTerminator)
}

/// Rebuilds minute-of-day departure times from decoded deltas. Times keep
/// counting past midnight, so a departure written as `0 10` after `23 50`
/// comes back as `24:10`.
///
/// # Errors
///
/// [`DecodeError::ClockOverflow`] if the running total leaves the `u32` range.
pub fn timeline(deltas: &[u32]) -> Result<Vec<u32>, DecodeError> {
    let mut clock = ANCHOR_MINUTES;
    deltas
        .iter()
        .enumerate()
        .map(|(index, delta)| {
            clock = clock
                .checked_add(*delta)
                .ok_or(DecodeError::ClockOverflow { index })?;
            Ok(clock)
        })
        .collect()
}

/// Whether `bytes` decodes to exactly the deltas of `departures`.
///
/// Deltas are compared rather than clock times: departures that go back in
/// file order, or wrap past midnight without the `+24` hour form, are
/// stored modulo one day and would never match their raw minute of day.
pub fn decodes_to(bytes: &[u8], departures: &[DepartureTime]) -> bool {
    match (decode_section(bytes), deltas(departures)) {
        (Ok(decoded), Ok(expected)) => decoded == expected,
        _ => false,
    }
}

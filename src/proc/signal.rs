//
//   Copyright 2026 The pidone Authors
//
//   Licensed under the Apache License, Version 2.0 (the "License");
//   you may not use this file except in compliance with the License.
//   You may obtain a copy of the License at
//
//       http://www.apache.org/licenses/LICENSE-2.0
//
//   Unless required by applicable law or agreed to in writing, software
//   distributed under the License is distributed on an "AS IS" BASIS,
//   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//   See the License for the specific language governing permissions and
//   limitations under the License.
//

use nix::sys::signal::Signal;

/// Highest signal number a decoded mask can hold. Only the low 32 bits of
/// the kernel mask are looked at.
pub const MAX_DECODED_SIGNAL: usize = 32;

/// A set of signal numbers, decoded from a kernel hex mask.
///
/// Internally stored as a boolean vector indexed by signal number, slot 0
/// is never set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalSet {
    signals: [bool; MAX_DECODED_SIGNAL + 1],
}

impl Default for SignalSet {
    fn default() -> Self {
        SignalSet {
            signals: [false; MAX_DECODED_SIGNAL + 1],
        }
    }
}

impl SignalSet {
    /// Whether the given signal number is a member of this set.
    pub fn contains(&self, sig: usize) -> bool {
        sig < self.signals.len() && self.signals[sig]
    }

    pub fn contains_signal(&self, sig: Signal) -> bool {
        self.contains(sig as i32 as usize)
    }

    /// Whether the set contains no signals.
    pub fn is_empty(&self) -> bool {
        !self.signals.iter().any(|&b| b)
    }

    pub fn len(&self) -> usize {
        self.signals.iter().filter(|&&b| b).count()
    }

    /// Iterate over the signal numbers that are set, in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.signals
            .iter()
            .enumerate()
            .filter_map(|(i, &set)| if set { Some(i) } else { None })
    }

    fn from_low_word(mask: u32) -> Self {
        let mut set = SignalSet::default();
        for bit in 0..MAX_DECODED_SIGNAL {
            if mask & (1 << bit) != 0 {
                set.signals[bit + 1] = true;
            }
        }
        set
    }
}

/// Signal disposition masks parsed from `/proc/[pid]/status`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalMasks {
    pub blocked: SignalSet,
    pub ignored: SignalSet,
    pub caught: SignalSet,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid hex digit '{0}' in signal mask")]
    InvalidDigit(char),
    #[error("signal mask has an odd number of hex digits ({0})")]
    OddLength(usize),
    #[error("signal mask too short: {0} bytes, need at least 8")]
    TooShort(usize),
}

fn nibble(ch: u8) -> Result<u8, DecodeError> {
    match ch {
        b'0'..=b'9' => Ok(ch - b'0'),
        b'a'..=b'f' => Ok(10 + (ch - b'a')),
        b'A'..=b'F' => Ok(10 + (ch - b'A')),
        _ => Err(DecodeError::InvalidDigit(ch as char)),
    }
}

/// Decode a hex signal mask (e.g. the value of `SigIgn`) into a [`SignalSet`].
///
/// The mask is hex-decoded into bytes and bytes 4..8 are read big-endian:
/// that is the low 32 bits of the 64-bit mask the kernel prints. Bit `n`
/// maps to signal `n + 1`.
pub fn decode(hex: &str) -> Result<SignalSet, DecodeError> {
    let hex = hex.trim().as_bytes();
    if hex.len() % 2 != 0 {
        return Err(DecodeError::OddLength(hex.len()));
    }

    let bytes = hex
        .chunks_exact(2)
        .map(|pair| Ok(nibble(pair[0])? << 4 | nibble(pair[1])?))
        .collect::<Result<Vec<u8>, DecodeError>>()?;
    if bytes.len() < 8 {
        return Err(DecodeError::TooShort(bytes.len()));
    }

    let word = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    Ok(SignalSet::from_low_word(word))
}

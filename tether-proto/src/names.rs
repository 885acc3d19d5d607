//! Packed string tables.
//!
//! Many names travel as one contiguous byte block plus an array of start
//! offsets into that block. String `i` spans `data[offsets[i]..offsets[i + 1]]`,
//! the last one running to the end of the block.

use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};

use crate::wire::{Decoder, Encoder, WireCodec, invalid};

/// Method names resolved by the agent, packed as class/name/signature triples.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodNames {
    /// UTF-8 bytes of every string, back to back.
    pub packed_data: Vec<u8>,
    /// Byte offset of each string inside [`Self::packed_data`].
    pub offsets: Vec<i32>,
}

/// One fully qualified method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodName {
    /// Declaring class, in internal form.
    pub class_name: String,
    /// Method name.
    pub method_name: String,
    /// JVM method descriptor.
    pub signature: String,
}

impl MethodNames {
    /// Packs `strings` into one block.
    pub fn pack<S: AsRef<str>>(strings: &[S]) -> io::Result<Self> {
        let mut packed_data = Vec::new();
        let mut offsets = Vec::with_capacity(strings.len());
        for s in strings {
            let at = i32::try_from(packed_data.len())
                .map_err(|_| invalid("packed name table exceeds i32::MAX bytes"))?;
            offsets.push(at);
            packed_data.extend_from_slice(s.as_ref().as_bytes());
        }
        Ok(Self {
            packed_data,
            offsets,
        })
    }

    /// Packs methods as consecutive class/name/signature triples.
    pub fn pack_methods(methods: &[MethodName]) -> io::Result<Self> {
        let flat: Vec<&str> = methods
            .iter()
            .flat_map(|m| [&*m.class_name, &*m.method_name, &*m.signature])
            .collect();
        Self::pack(&flat)
    }

    /// Number of strings in the table.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Whether the table holds no strings.
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Byte range of string `index`.
    fn span(&self, index: usize) -> Option<(usize, usize)> {
        let start = usize::try_from(*self.offsets.get(index)?).ok()?;
        let end = match self.offsets.get(index + 1) {
            Some(&next) => usize::try_from(next).ok()?,
            None => self.packed_data.len(),
        };
        (start <= end && end <= self.packed_data.len()).then_some((start, end))
    }

    /// String `index`, or `None` if out of range or not valid UTF-8.
    pub fn get(&self, index: usize) -> Option<&str> {
        let (start, end) = self.span(index)?;
        std::str::from_utf8(&self.packed_data[start..end]).ok()
    }

    /// Iterates over every string in the table.
    pub fn iter(&self) -> impl Iterator<Item = Option<&str>> + '_ {
        (0..self.len()).map(|i| self.get(i))
    }

    /// Copies every string out of the table.
    pub fn unpack(&self) -> io::Result<Vec<String>> {
        self.iter()
            .enumerate()
            .map(|(i, s)| {
                s.map(str::to_owned)
                    .ok_or_else(|| invalid(format!("packed string {i} is malformed")))
            })
            .collect()
    }

    /// Groups the table into class/name/signature triples.
    pub fn methods(&self) -> io::Result<Vec<MethodName>> {
        if self.len() % 3 != 0 {
            return Err(invalid(format!(
                "method name table holds {} strings, not a multiple of 3",
                self.len()
            )));
        }
        let flat = self.unpack()?;
        Ok(flat
            .chunks_exact(3)
            .map(|t| MethodName {
                class_name: t[0].clone(),
                method_name: t[1].clone(),
                signature: t[2].clone(),
            })
            .collect())
    }

    /// Checks that offsets are non-decreasing and inside the block.
    fn validate(&self) -> io::Result<()> {
        let mut prev = 0usize;
        for (i, &raw) in self.offsets.iter().enumerate() {
            let at = usize::try_from(raw)
                .map_err(|_| invalid(format!("negative offset {raw} at index {i}")))?;
            if at < prev || at > self.packed_data.len() {
                return Err(invalid(format!("offset {at} at index {i} out of order or range")));
            }
            prev = at;
        }
        Ok(())
    }
}

impl WireCodec for MethodNames {
    fn encode<W: Write>(&self, e: &mut Encoder<W>) -> io::Result<()> {
        self.validate()?;
        e.write_bytes(&self.packed_data)?;
        e.write_i32s(&self.offsets)
    }

    fn decode<R: Read>(d: &mut Decoder<R>) -> io::Result<Self> {
        let names = Self {
            packed_data: d.read_bytes()?,
            offsets: d.read_i32s()?,
        };
        names.validate()?;
        Ok(names)
    }
}

impl MethodName {
    /// Builds a method name.
    pub fn new(
        class_name: impl Into<String>,
        method_name: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: method_name.into(),
            signature: signature.into(),
        }
    }
}

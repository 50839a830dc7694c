//! Serde helpers for fixed-size arrays whose length is a const generic
//! parameter. Serde only implements its traits for arrays of literal length,
//! so fields of type `[T; D]` are annotated with
//! `#[serde(with = "crate::array")]` and go through these functions instead.
//!

use core::marker::PhantomData;
use serde::de::{self, Deserialize, Deserializer, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeSeq, Serializer};

pub fn serialize<S, T, const N: usize>(array: &[T; N], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize,
{
    let mut seq = serializer.serialize_seq(Some(N))?;

    for x in array {
        seq.serialize_element(x)?;
    }
    seq.end()
}

pub fn deserialize<'de, De, T, const N: usize>(deserializer: De) -> Result<[T; N], De::Error>
where
    De: Deserializer<'de>,
    T: Deserialize<'de>,
{
    deserializer.deserialize_seq(ArrayVisitor::<T, N>(PhantomData))
}

struct ArrayVisitor<T, const N: usize>(PhantomData<T>);

impl<'de, T: Deserialize<'de>, const N: usize> Visitor<'de> for ArrayVisitor<T, N> {
    type Value = [T; N];

    fn expecting(&self, formatter: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(formatter, "a sequence of length {}", N)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut items = Vec::with_capacity(N);

        while let Some(x) = seq.next_element()? {
            items.push(x)
        }
        let found = items.len();
        items.try_into().map_err(|_| de::Error::invalid_length(found, &self))
    }
}

//! Static slot serializer.
//!
//! Every value is written as a sequence of 32-byte slots:
//! - unsigned integers and `bool` are big-endian and right aligned,
//! - byte strings (`serialize_bytes`) are left aligned and zero padded to the
//!   next multiple of [SLOT_SIZE],
//! - structs, tuples and tuple structs are the concatenation of their fields
//!   in declaration order, without any length or offset prefix.
//!
//! This is the static subset of the Solidity ABI encoding. Amounts and
//! sequence numbers are never negative, so signed integers are rejected along
//! with everything dynamic. Two values with the same fields always produce
//! the same bytes.

use super::error::{Error, Result};
use serde::{
    ser::{self, Impossible, SerializeStruct, SerializeTuple, SerializeTupleStruct},
    Serialize,
};

pub const SLOT_SIZE: usize = 32; // bytes

/// Receives the encoded slots, always [SLOT_SIZE] bytes at a time.
pub trait Writer {
    fn write(&mut self, slot: &[u8]);
}

impl Writer for Vec<u8> {
    fn write(&mut self, slot: &[u8]) {
        self.extend_from_slice(slot);
    }
}

pub struct Serializer<'a, W>
where
    W: Writer,
{
    writer: &'a mut W,
}

pub fn to_writer<T, W>(value: &T, writer: &mut W) -> Result<()>
where
    T: Serialize + ?Sized,
    W: Writer,
{
    let mut serializer = Serializer { writer };
    value.serialize(&mut serializer)
}

/// Encode `value` into a freshly allocated buffer.
pub fn to_bytes<T>(value: &T) -> Result<Vec<u8>>
where
    T: Serialize + ?Sized,
{
    let mut buf = Vec::new();
    to_writer(value, &mut buf)?;
    Ok(buf)
}

impl<'a, W> Serializer<'a, W>
where
    W: Writer,
{
    fn write_right_aligned(&mut self, bytes: &[u8]) {
        debug_assert!(bytes.len() <= SLOT_SIZE);
        let mut slot = [0u8; SLOT_SIZE];
        slot[SLOT_SIZE - bytes.len()..].copy_from_slice(bytes);
        self.writer.write(&slot);
    }

    fn write_left_aligned(&mut self, bytes: &[u8]) {
        for chunk in bytes.chunks(SLOT_SIZE) {
            let mut slot = [0u8; SLOT_SIZE];
            slot[..chunk.len()].copy_from_slice(chunk);
            self.writer.write(&slot);
        }
    }
}

macro_rules! unsigned {
    ($method:ident, $t:ty) => {
        fn $method(self, v: $t) -> Result<()> {
            self.write_right_aligned(&v.to_be_bytes());
            Ok(())
        }
    };
}

macro_rules! signed {
    ($method:ident, $t:ty) => {
        fn $method(self, _v: $t) -> Result<()> {
            Err(Error::TypeNotRepresentable(stringify!($t)))
        }
    };
}

impl<'a, 'b, W> ser::Serializer for &'b mut Serializer<'a, W>
where
    W: Writer,
{
    type Ok = ();
    type Error = Error;

    type SerializeSeq = Impossible<(), Error>;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Impossible<(), Error>;
    type SerializeMap = Impossible<(), Error>;
    type SerializeStruct = Self;
    type SerializeStructVariant = Impossible<(), Error>;

    fn is_human_readable(&self) -> bool {
        false
    }

    fn serialize_bool(self, v: bool) -> Result<()> {
        self.write_right_aligned(&[v as u8]);
        Ok(())
    }

    unsigned!(serialize_u8, u8);
    unsigned!(serialize_u16, u16);
    unsigned!(serialize_u32, u32);
    unsigned!(serialize_u64, u64);
    unsigned!(serialize_u128, u128);

    signed!(serialize_i8, i8);
    signed!(serialize_i16, i16);
    signed!(serialize_i32, i32);
    signed!(serialize_i64, i64);
    signed!(serialize_i128, i128);

    fn serialize_f32(self, _v: f32) -> Result<()> {
        Err(Error::TypeNotRepresentable("f32"))
    }

    fn serialize_f64(self, _v: f64) -> Result<()> {
        Err(Error::TypeNotRepresentable("f64"))
    }

    fn serialize_char(self, _v: char) -> Result<()> {
        Err(Error::TypeNotRepresentable("char"))
    }

    fn serialize_str(self, _v: &str) -> Result<()> {
        Err(Error::TypeNotRepresentable("str"))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<()> {
        self.write_left_aligned(v);
        Ok(())
    }

    fn serialize_none(self) -> Result<()> {
        Err(Error::TypeNotRepresentable("Option"))
    }

    fn serialize_some<T>(self, _value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        Err(Error::TypeNotRepresentable("Option"))
    }

    fn serialize_unit(self) -> Result<()> {
        Err(Error::TypeNotRepresentable("()"))
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<()> {
        Err(Error::TypeNotRepresentable("unit struct"))
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
    ) -> Result<()> {
        Err(Error::TypeNotRepresentable("enum"))
    }

    fn serialize_newtype_struct<T>(self, _name: &'static str, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T>(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        Err(Error::TypeNotRepresentable("enum"))
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq> {
        Err(Error::TypeNotRepresentable("dynamic sequence"))
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple> {
        Ok(self)
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        Ok(self)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Err(Error::TypeNotRepresentable("enum"))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap> {
        Err(Error::TypeNotRepresentable("map"))
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeStruct> {
        Ok(self)
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Err(Error::TypeNotRepresentable("enum"))
    }
}

impl<'a, 'b, W> SerializeTuple for &'b mut Serializer<'a, W>
where
    W: Writer,
{
    type Ok = ();
    type Error = Error;

    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl<'a, 'b, W> SerializeTupleStruct for &'b mut Serializer<'a, W>
where
    W: Writer,
{
    type Ok = ();
    type Error = Error;

    fn serialize_field<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl<'a, 'b, W> SerializeStruct for &'b mut Serializer<'a, W>
where
    W: Writer,
{
    type Ok = ();
    type Error = Error;

    fn serialize_field<T>(&mut self, _key: &'static str, value: &T) -> Result<()>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

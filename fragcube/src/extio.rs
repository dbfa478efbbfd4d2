//! Extend Read and Write with some convenience methods for binary i/o
//!
use std::io::{self, Cursor, Read, Write};

use crate::errors::Result;

pub(crate) trait Serialize: Sized {
    /// Write self to a stream
    fn write_to(&self, stream: &mut impl Write) -> Result<()>;

    /// Read Self from a stream
    fn read_from(stream: &mut impl Read) -> Result<Self>;

    /// Write self to a fresh byte buffer
    fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;

        Ok(buffer)
    }

    /// Read Self back from a byte buffer
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::read_from(&mut Cursor::new(bytes))
    }
}

pub(crate) trait ExtendedRead: Read {
    /// Read a byte from a stream
    fn read_byte(&mut self) -> io::Result<u8>;

    /// Read a Big Endian encoded 16 bit unsigned integer from a stream
    fn read_u16(&mut self) -> io::Result<u16>;

    /// Read a Big Endian encoded 32 bit signed integer from a stream
    fn read_i32(&mut self) -> io::Result<i32>;

    /// Read a Big Endian encoded 32 bit unsigned integer from a stream
    fn read_u32(&mut self) -> io::Result<u32>;

    /// Read a Big Endian encoded 64 bit signed integer from a stream
    fn read_i64(&mut self) -> io::Result<i64>;

    /// Read a Big Endian encoded 64 bit unsigned integer from a stream
    fn read_u64(&mut self) -> io::Result<u64>;

    /// Read a Big Endian encoded 32 bit float from a stream
    fn read_f32(&mut self) -> io::Result<f32>;

    /// Read a Big Endian encoded 64 bit float from a stream
    fn read_f64(&mut self) -> io::Result<f64>;

    /// Read a length prefixed UTF-8 string from a stream
    fn read_str(&mut self) -> io::Result<String>;
}

impl<R: Read> ExtendedRead for R {
    /// Read a byte from a stream
    fn read_byte(&mut self) -> io::Result<u8> {
        let mut buffer = [0; 1];
        self.read_exact(&mut buffer)?;

        Ok(buffer[0])
    }

    /// Read a Big Endian encoded 16 bit unsigned integer from a stream
    fn read_u16(&mut self) -> io::Result<u16> {
        let mut buffer = [0; 2];
        self.read_exact(&mut buffer)?;

        Ok(u16::from_be_bytes(buffer))
    }

    /// Read a Big Endian encoded 32 bit signed integer from a stream
    fn read_i32(&mut self) -> io::Result<i32> {
        let mut buffer = [0; 4];
        self.read_exact(&mut buffer)?;

        Ok(i32::from_be_bytes(buffer))
    }

    /// Read a Big Endian encoded 32 bit unsigned integer from a stream
    fn read_u32(&mut self) -> io::Result<u32> {
        let mut buffer = [0; 4];
        self.read_exact(&mut buffer)?;

        Ok(u32::from_be_bytes(buffer))
    }

    /// Read a Big Endian encoded 64 bit signed integer from a stream
    fn read_i64(&mut self) -> io::Result<i64> {
        let mut buffer = [0; 8];
        self.read_exact(&mut buffer)?;

        Ok(i64::from_be_bytes(buffer))
    }

    /// Read a Big Endian encoded 64 bit unsigned integer from a stream
    fn read_u64(&mut self) -> io::Result<u64> {
        let mut buffer = [0; 8];
        self.read_exact(&mut buffer)?;

        Ok(u64::from_be_bytes(buffer))
    }

    /// Read a Big Endian encoded 32 bit float from a stream
    fn read_f32(&mut self) -> io::Result<f32> {
        let mut buffer = [0; 4];
        self.read_exact(&mut buffer)?;

        Ok(f32::from_be_bytes(buffer))
    }

    /// Read a Big Endian encoded 64 bit float from a stream
    fn read_f64(&mut self) -> io::Result<f64> {
        let mut buffer = [0; 8];
        self.read_exact(&mut buffer)?;

        Ok(f64::from_be_bytes(buffer))
    }

    /// Read a length prefixed UTF-8 string from a stream
    fn read_str(&mut self) -> io::Result<String> {
        let length = self.read_u16()? as usize;
        let mut buffer = vec![0; length];
        self.read_exact(&mut buffer)?;

        String::from_utf8(buffer).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }
}

pub(crate) trait ExtendedWrite: Write {
    /// Write a byte to a stream
    fn write_byte(&mut self, byte: u8) -> io::Result<()>;

    /// Write a Big Endian encoded 16 bit unsigned integer to a stream
    fn write_u16(&mut self, word: u16) -> io::Result<()>;

    /// Write a Big Endian encoded 32 bit signed integer to a stream
    fn write_i32(&mut self, word: i32) -> io::Result<()>;

    /// Write a Big Endian encoded 32 bit unsigned integer to a stream
    fn write_u32(&mut self, word: u32) -> io::Result<()>;

    /// Write a Big Endian encoded 64 bit signed integer to a stream
    fn write_i64(&mut self, word: i64) -> io::Result<()>;

    /// Write a Big Endian encoded 64 bit unsigned integer to a stream
    fn write_u64(&mut self, word: u64) -> io::Result<()>;

    /// Write a Big Endian encoded 32 bit float to a stream
    fn write_f32(&mut self, word: f32) -> io::Result<()>;

    /// Write a Big Endian encoded 64 bit float to a stream
    fn write_f64(&mut self, word: f64) -> io::Result<()>;

    /// Write a length prefixed UTF-8 string to a stream
    fn write_str(&mut self, value: &str) -> io::Result<()>;
}

impl<W: Write> ExtendedWrite for W {
    /// Write a byte to a stream
    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        let buffer = [byte];
        self.write_all(&buffer)?;

        Ok(())
    }

    /// Write a Big Endian encoded 16 bit unsigned integer to a stream
    fn write_u16(&mut self, word: u16) -> io::Result<()> {
        let buffer = word.to_be_bytes();
        self.write_all(&buffer)?;

        Ok(())
    }

    /// Write a Big Endian encoded 32 bit signed integer to a stream
    fn write_i32(&mut self, word: i32) -> io::Result<()> {
        let buffer = word.to_be_bytes();
        self.write_all(&buffer)?;

        Ok(())
    }

    /// Write a Big Endian encoded 32 bit unsigned integer to a stream
    fn write_u32(&mut self, word: u32) -> io::Result<()> {
        let buffer = word.to_be_bytes();
        self.write_all(&buffer)?;

        Ok(())
    }

    /// Write a Big Endian encoded 64 bit signed integer to a stream
    fn write_i64(&mut self, word: i64) -> io::Result<()> {
        let buffer = word.to_be_bytes();
        self.write_all(&buffer)?;

        Ok(())
    }

    /// Write a Big Endian encoded 64 bit unsigned integer to a stream
    fn write_u64(&mut self, word: u64) -> io::Result<()> {
        let buffer = word.to_be_bytes();
        self.write_all(&buffer)?;

        Ok(())
    }

    /// Write a Big Endian encoded 32 bit float to a stream
    fn write_f32(&mut self, word: f32) -> io::Result<()> {
        let buffer = word.to_be_bytes();
        self.write_all(&buffer)?;

        Ok(())
    }

    /// Write a Big Endian encoded 64 bit float to a stream
    fn write_f64(&mut self, word: f64) -> io::Result<()> {
        let buffer = word.to_be_bytes();
        self.write_all(&buffer)?;

        Ok(())
    }

    /// Write a length prefixed UTF-8 string to a stream
    fn write_str(&mut self, value: &str) -> io::Result<()> {
        self.write_u16(value.len() as u16)?;
        self.write_all(value.as_bytes())?;

        Ok(())
    }
}

use std::{
    fmt,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, hex_digit1, one_of, space0, space1, u32 as dec_u32},
    combinator::{map_res, opt},
    sequence::preceded,
    IResult,
};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;

use crate::addr::Addr;

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("line {line}: malformed record `{content}`")]
    Malformed { line: usize, content: String },
    #[error("failed to read trace: {0}")]
    Io(#[from] std::io::Error),
}

impl TraceError {
    /// malformed records are skipped; anything else ends the replay.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TraceError::Malformed { .. })
    }
}

/// operation kind, stored as the letter used in trace files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum OpKind {
    /// `I`
    Instruction = 0x49,
    /// `L`
    Load = 0x4c,
    /// `S`
    Store = 0x53,
    /// `M`, a load then a store to the same address
    Modify = 0x4d,
}

impl OpKind {
    pub fn letter(self) -> char {
        u8::from(self) as char
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceRecord {
    pub kind: OpKind,
    pub addr: Addr,
    /// bytes touched. unused by the model.
    pub size: Option<u32>,
}

impl fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.addr)?;
        if let Some(size) = self.size {
            write!(f, ",{size}")?;
        }
        Ok(())
    }
}

impl TraceRecord {
    pub fn new(kind: OpKind, addr: u64, size: u32) -> Self {
        Self {
            kind,
            addr: Addr::new(addr),
            size: Some(size),
        }
    }

    /// parses one trace line. blank lines give `Ok(None)`.
    ///
    /// only kind and address decide whether a line is a record. a size that
    /// does not parse is dropped, and whatever follows it is ignored.
    pub fn parse(line: &str) -> Result<Option<Self>, nom::Err<nom::error::Error<&str>>> {
        if line.trim().is_empty() {
            return Ok(None);
        }
        let (_, record) = read_record(line)?;
        Ok(Some(record))
    }
}

fn read_kind(input: &str) -> IResult<&str, OpKind> {
    map_res(one_of("ILSM"), |c| OpKind::try_from(c as u8))(input)
}

fn read_addr(input: &str) -> IResult<&str, Addr> {
    let (input, _) = opt(alt((tag("0x"), tag("0X"))))(input)?;
    map_res(hex_digit1, |h| u64::from_str_radix(h, 16).map(Addr::new))(input)
}

fn read_record(input: &str) -> IResult<&str, TraceRecord> {
    let (input, _) = space0(input)?;
    let (input, kind) = read_kind(input)?;
    let (input, _) = space1(input)?;
    let (input, addr) = read_addr(input)?;
    let (input, size) = opt(preceded(char(','), dec_u32))(input)?;
    Ok((input, TraceRecord { kind, addr, size }))
}

/// streams records out of a trace, one line at a time.
pub struct TraceReader<R> {
    lines: std::io::Split<R>,
    line_no: usize,
}

impl TraceReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> TraceReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.split(b'\n'),
            line_no: 0,
        }
    }

    /// number of lines consumed so far.
    pub fn line_no(&self) -> usize {
        self.line_no
    }
}

impl<R: BufRead> Iterator for TraceReader<R> {
    type Item = Result<TraceRecord, TraceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let raw = match self.lines.next()? {
                Ok(raw) => raw,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_no += 1;
            let line = String::from_utf8_lossy(&raw);
            match TraceRecord::parse(&line) {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => continue,
                Err(_) => {
                    return Some(Err(TraceError::Malformed {
                        line: self.line_no,
                        content: line.trim_end().to_owned(),
                    }))
                }
            }
        }
    }
}

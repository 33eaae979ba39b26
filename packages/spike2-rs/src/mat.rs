//! MATLAB Level-5 MAT container reader
//!
//! Spike2 exports every channel as a top-level 1x1 struct whose field set
//! depends on the channel type. The `matfile` crate only surfaces numeric
//! arrays, so this reader walks the element stream itself and keeps structs,
//! cells and char arrays intact.
//!
//! Layout reference: MATLAB "MAT-File Format" (Level 5), chapter 1.
//! - 128 byte header: 116 bytes text, 8 bytes subsystem offset, 2 bytes
//!   version, 2 bytes endian indicator ("IM" when little-endian)
//! - Sequence of tagged data elements, each padded to 8 bytes
//! - `miCOMPRESSED` elements hold a zlib stream with one `miMATRIX` inside

use crate::error::{Result, Spike2Error};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use flate2::read::ZlibDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const HEADER_LEN: usize = 128;
const HDF5_MAGIC: [u8; 8] = [0x89, 0x48, 0x44, 0x46, 0x0d, 0x0a, 0x1a, 0x0a];

// Data element types
const MI_INT8: u32 = 1;
const MI_UINT8: u32 = 2;
const MI_INT16: u32 = 3;
const MI_UINT16: u32 = 4;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_SINGLE: u32 = 7;
const MI_DOUBLE: u32 = 9;
const MI_INT64: u32 = 12;
const MI_UINT64: u32 = 13;
const MI_MATRIX: u32 = 14;
const MI_COMPRESSED: u32 = 15;
const MI_UTF8: u32 = 16;
const MI_UTF16: u32 = 17;
const MI_UTF32: u32 = 18;

// Array flag bits
const FLAG_COMPLEX: u32 = 0x0800;

/// Every data element, even an empty one, starts with an 8 byte tag
const ELEMENT_TAG_LEN: usize = 8;

/// MATLAB array class, as stored in the array flags sub-element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatClass {
    Cell,
    Struct,
    Object,
    Char,
    Sparse,
    Double,
    Single,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Function,
    Unknown(u8),
}

impl MatClass {
    fn from_code(code: u8) -> Self {
        match code {
            1 => MatClass::Cell,
            2 => MatClass::Struct,
            3 => MatClass::Object,
            4 => MatClass::Char,
            5 => MatClass::Sparse,
            6 => MatClass::Double,
            7 => MatClass::Single,
            8 => MatClass::Int8,
            9 => MatClass::UInt8,
            10 => MatClass::Int16,
            11 => MatClass::UInt16,
            12 => MatClass::Int32,
            13 => MatClass::UInt32,
            14 => MatClass::Int64,
            15 => MatClass::UInt64,
            16 => MatClass::Function,
            other => MatClass::Unknown(other),
        }
    }

    /// Width in bytes of one element of a numeric class
    pub fn byte_width(&self) -> usize {
        match self {
            MatClass::Int8 | MatClass::UInt8 => 1,
            MatClass::Int16 | MatClass::UInt16 | MatClass::Char => 2,
            MatClass::Int32 | MatClass::UInt32 | MatClass::Single => 4,
            _ => 8,
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(
            self,
            MatClass::Double
                | MatClass::Single
                | MatClass::Int8
                | MatClass::UInt8
                | MatClass::Int16
                | MatClass::UInt16
                | MatClass::Int32
                | MatClass::UInt32
                | MatClass::Int64
                | MatClass::UInt64
        )
    }
}

/// One decoded MATLAB array
#[derive(Debug, Clone, PartialEq)]
pub enum MatValue {
    Numeric(NumericArray),
    Char(CharArray),
    Struct(StructArray),
    Cell(CellArray),
    /// Sparse, object and function handle arrays are kept as placeholders
    Unsupported(MatClass),
}

impl MatValue {
    pub fn as_numeric(&self) -> Option<&NumericArray> {
        match self {
            MatValue::Numeric(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_char(&self) -> Option<&CharArray> {
        match self {
            MatValue::Char(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructArray> {
        match self {
            MatValue::Struct(arr) => Some(arr),
            _ => None,
        }
    }

    /// Number of elements, regardless of class
    pub fn len(&self) -> usize {
        match self {
            MatValue::Numeric(arr) => arr.data.len(),
            MatValue::Char(arr) => arr.data.len(),
            MatValue::Struct(arr) => arr.elements.len(),
            MatValue::Cell(arr) => arr.cells.len(),
            MatValue::Unsupported(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short class description used in diagnostics
    pub fn class_name(&self) -> &'static str {
        match self {
            MatValue::Numeric(_) => "numeric",
            MatValue::Char(_) => "char",
            MatValue::Struct(_) => "struct",
            MatValue::Cell(_) => "cell",
            MatValue::Unsupported(_) => "unsupported",
        }
    }
}

/// Real-valued numeric array in MATLAB storage (column-major) order
#[derive(Debug, Clone, PartialEq)]
pub struct NumericArray {
    pub class: MatClass,
    pub dims: Vec<usize>,
    pub data: Vec<f64>,
}

impl NumericArray {
    pub fn new(class: MatClass, dims: Vec<usize>, data: Vec<f64>) -> Self {
        Self { class, dims, data }
    }

    /// Column vector of doubles, the shape Spike2 uses for `times`/`values`
    pub fn column(data: Vec<f64>) -> Self {
        let dims = vec![data.len(), 1];
        Self::new(MatClass::Double, dims, data)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn scalar(&self) -> Option<f64> {
        self.data.first().copied()
    }

    /// Elements in row-major (C) order.
    ///
    /// MATLAB stores column-major; exports are consumed row by row, so this
    /// reorders to match the way the array reads when flattened along its
    /// last dimension first.
    pub fn flatten(&self) -> Vec<f64> {
        row_major_order(&self.dims, self.data.len())
            .into_iter()
            .map(|idx| self.data[idx])
            .collect()
    }

    /// Row-major elements re-encoded as little-endian bytes of the array class
    pub fn packed_bytes(&self) -> Vec<u8> {
        let width = self.class.byte_width();
        let mut bytes = Vec::with_capacity(self.data.len() * width);
        for value in self.flatten() {
            match self.class {
                MatClass::Int8 => bytes.push(value as i8 as u8),
                MatClass::UInt8 => bytes.push(value as u8),
                MatClass::Int16 => bytes.extend_from_slice(&(value as i16).to_le_bytes()),
                MatClass::UInt16 => bytes.extend_from_slice(&(value as u16).to_le_bytes()),
                MatClass::Int32 => bytes.extend_from_slice(&(value as i32).to_le_bytes()),
                MatClass::UInt32 => bytes.extend_from_slice(&(value as u32).to_le_bytes()),
                MatClass::Single => bytes.extend_from_slice(&(value as f32).to_le_bytes()),
                MatClass::Int64 => bytes.extend_from_slice(&(value as i64).to_le_bytes()),
                MatClass::UInt64 => bytes.extend_from_slice(&(value as u64).to_le_bytes()),
                _ => bytes.extend_from_slice(&value.to_le_bytes()),
            }
        }
        bytes
    }
}

/// Character array in MATLAB storage order
#[derive(Debug, Clone, PartialEq)]
pub struct CharArray {
    pub dims: Vec<usize>,
    pub data: Vec<char>,
}

impl CharArray {
    pub fn from_text(text: &str) -> Self {
        let data: Vec<char> = text.chars().collect();
        Self {
            dims: vec![1, data.len()],
            data,
        }
    }

    /// One string per row of a 2-D char matrix
    pub fn rows(&self) -> Vec<String> {
        if self.data.is_empty() {
            return Vec::new();
        }
        let rows = self.dims.first().copied().unwrap_or(1).max(1);
        let cols = self.data.len() / rows;
        (0..rows)
            .map(|row| (0..cols).map(|col| self.data[col * rows + row]).collect())
            .collect()
    }
}

/// Struct array; `elements[i][j]` is field `j` of element `i`
#[derive(Debug, Clone, PartialEq)]
pub struct StructArray {
    pub dims: Vec<usize>,
    pub field_names: Vec<String>,
    pub elements: Vec<Vec<MatValue>>,
}

impl StructArray {
    pub fn field_count(&self) -> usize {
        self.field_names.len()
    }

    /// Field of the first element, the only one Spike2 writes per channel
    pub fn field(&self, name: &str) -> Option<&MatValue> {
        let idx = self.field_names.iter().position(|f| f == name)?;
        self.elements.first().and_then(|element| element.get(idx))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CellArray {
    pub dims: Vec<usize>,
    pub cells: Vec<MatValue>,
}

/// Fully parsed MAT file: named top-level variables in file order
#[derive(Debug, Clone)]
pub struct MatFile {
    header_text: String,
    variables: Vec<(String, MatValue)>,
}

impl MatFile {
    /// Read and parse the whole file into memory
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Spike2Error::FileNotFound(path.display().to_string()));
        }
        let mut bytes = Vec::new();
        BufReader::new(File::open(path)?).read_to_end(&mut bytes)?;
        log::debug!("Read {} bytes from {}", bytes.len(), path.display());
        Self::from_bytes(&bytes)
    }

    pub fn parse<R: Read>(mut reader: R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.starts_with(&HDF5_MAGIC) || is_v73(bytes) {
            return Err(Spike2Error::WrongFileType(
                "This file uses MATLAB v7.3 (HDF5) format, which is not supported.".to_string(),
            ));
        }
        if bytes.len() < HEADER_LEN {
            return Err(Spike2Error::ParseError(format!(
                "file is {} bytes, shorter than the {} byte MAT header",
                bytes.len(),
                HEADER_LEN
            )));
        }

        let endian = match &bytes[126..128] {
            b"IM" => Endian::Little,
            b"MI" => Endian::Big,
            other => {
                return Err(Spike2Error::ParseError(format!(
                    "invalid endian indicator {:?}; not a Level 5 MAT file",
                    other
                )))
            }
        };
        let header_text = String::from_utf8_lossy(&bytes[..116])
            .trim_end_matches(|c: char| c == ' ' || c == '\0')
            .to_string();

        let mut variables = Vec::new();
        let mut reader = ElementReader::new(&bytes[HEADER_LEN..], endian);
        while let Some(element) = reader.next_element()? {
            match element.data_type {
                MI_MATRIX => {
                    let (name, value) = parse_matrix(element.data, endian)?;
                    variables.push((name, value));
                }
                MI_COMPRESSED => {
                    let mut inflated = Vec::new();
                    ZlibDecoder::new(element.data)
                        .read_to_end(&mut inflated)
                        .map_err(|e| {
                            Spike2Error::ParseError(format!("failed to inflate element: {}", e))
                        })?;
                    let mut inner = ElementReader::new(&inflated, endian);
                    while let Some(inner_element) = inner.next_element()? {
                        if inner_element.data_type == MI_MATRIX {
                            let (name, value) = parse_matrix(inner_element.data, endian)?;
                            variables.push((name, value));
                        }
                    }
                }
                other => {
                    log::warn!("Skipping top-level element of type {}", other);
                }
            }
        }

        log::debug!("Parsed {} top-level variables", variables.len());
        Ok(Self {
            header_text,
            variables,
        })
    }

    /// Descriptive text from the 116 byte header
    pub fn header_text(&self) -> &str {
        &self.header_text
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(|(name, _)| name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&MatValue> {
        self.variables
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
    }

    pub fn variables(&self) -> &[(String, MatValue)] {
        &self.variables
    }

    pub fn into_variables(self) -> Vec<(String, MatValue)> {
        self.variables
    }
}

fn is_v73(bytes: &[u8]) -> bool {
    bytes.starts_with(b"MATLAB 7.3") || bytes.get(512..520) == Some(&HDF5_MAGIC[..])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

impl Endian {
    fn u16(self, buf: &[u8]) -> u16 {
        match self {
            Endian::Little => LittleEndian::read_u16(buf),
            Endian::Big => BigEndian::read_u16(buf),
        }
    }

    fn u32(self, buf: &[u8]) -> u32 {
        match self {
            Endian::Little => LittleEndian::read_u32(buf),
            Endian::Big => BigEndian::read_u32(buf),
        }
    }

    fn u64(self, buf: &[u8]) -> u64 {
        match self {
            Endian::Little => LittleEndian::read_u64(buf),
            Endian::Big => BigEndian::read_u64(buf),
        }
    }

    fn f32(self, buf: &[u8]) -> f32 {
        match self {
            Endian::Little => LittleEndian::read_f32(buf),
            Endian::Big => BigEndian::read_f32(buf),
        }
    }

    fn f64(self, buf: &[u8]) -> f64 {
        match self {
            Endian::Little => LittleEndian::read_f64(buf),
            Endian::Big => BigEndian::read_f64(buf),
        }
    }
}

struct Element<'a> {
    data_type: u32,
    data: &'a [u8],
}

/// Cursor over a buffer of tagged data elements
struct ElementReader<'a> {
    buf: &'a [u8],
    pos: usize,
    endian: Endian,
}

impl<'a> ElementReader<'a> {
    fn new(buf: &'a [u8], endian: Endian) -> Self {
        Self {
            buf,
            pos: 0,
            endian,
        }
    }

    fn next_element(&mut self) -> Result<Option<Element<'a>>> {
        if self.pos >= self.buf.len() {
            return Ok(None);
        }
        let tag = self.take(4)?;
        let first = self.endian.u32(tag);

        // Small data element: byte count in the upper half, payload in the next 4 bytes
        if first >> 16 != 0 {
            let data_type = first & 0xffff;
            let num_bytes = (first >> 16) as usize;
            let payload = self.take(4)?;
            if num_bytes > 4 {
                return Err(Spike2Error::ParseError(format!(
                    "small data element claims {} bytes",
                    num_bytes
                )));
            }
            return Ok(Some(Element {
                data_type,
                data: &payload[..num_bytes],
            }));
        }

        let data_type = first;
        let num_bytes = self.endian.u32(self.take(4)?) as usize;
        let data = self.take(num_bytes)?;
        if data_type != MI_COMPRESSED {
            let padding = (8 - num_bytes % 8) % 8;
            self.pos = (self.pos + padding).min(self.buf.len());
        }
        Ok(Some(Element { data_type, data }))
    }

    /// Fail unless `count` more elements could fit in the unread bytes
    fn ensure_room(&self, count: usize, what: &str) -> Result<()> {
        let room = self.buf.len().saturating_sub(self.pos) / ELEMENT_TAG_LEN;
        if count > room {
            return Err(Spike2Error::ParseError(format!(
                "'{}' claims {} nested arrays but only {} bytes remain",
                what,
                count,
                self.buf.len().saturating_sub(self.pos)
            )));
        }
        Ok(())
    }

    fn expect_element(&mut self, what: &str) -> Result<Element<'a>> {
        self.next_element()?.ok_or_else(|| {
            Spike2Error::ParseError(format!("array ended before its {} sub-element", what))
        })
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).filter(|&end| end <= self.buf.len());
        match end {
            Some(end) => {
                let slice = &self.buf[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(Spike2Error::ParseError(format!(
                "truncated data element: needed {} bytes at offset {}, {} available",
                len,
                self.pos,
                self.buf.len().saturating_sub(self.pos)
            ))),
        }
    }
}

/// Parse the body of an `miMATRIX` element into its name and value
fn parse_matrix(body: &[u8], endian: Endian) -> Result<(String, MatValue)> {
    // Zero-byte matrices are how empty struct fields are written
    if body.is_empty() {
        let empty = NumericArray::new(MatClass::Double, vec![0, 0], Vec::new());
        return Ok((String::new(), MatValue::Numeric(empty)));
    }

    let mut reader = ElementReader::new(body, endian);

    let flags_element = reader.expect_element("array flags")?;
    if flags_element.data.len() < 4 {
        return Err(Spike2Error::ParseError(
            "array flags sub-element is too short".to_string(),
        ));
    }
    let flags = endian.u32(flags_element.data);
    let class = MatClass::from_code((flags & 0xff) as u8);
    let is_complex = flags & FLAG_COMPLEX != 0;

    let dims_element = reader.expect_element("dimensions")?;
    let dims: Vec<usize> = decode_numeric(&dims_element, endian)?
        .into_iter()
        .map(|d| d.max(0.0) as usize)
        .collect();
    let count = dims
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| {
            Spike2Error::ParseError(format!("array dimensions {:?} overflow", dims))
        })?;

    let name_element = reader.expect_element("array name")?;
    let name = String::from_utf8_lossy(name_element.data)
        .trim_end_matches('\0')
        .to_string();

    let value = match class {
        c if c.is_numeric() => {
            let real = reader.expect_element("real part")?;
            let data = decode_numeric(&real, endian)?;
            if is_complex {
                log::debug!("Discarding imaginary part of '{}'", name);
            }
            if data.len() != count {
                return Err(Spike2Error::ParseError(format!(
                    "array '{}' has dimensions {:?} but {} elements",
                    name,
                    dims,
                    data.len()
                )));
            }
            MatValue::Numeric(NumericArray::new(class, dims, data))
        }
        MatClass::Char => {
            let data = match reader.next_element()? {
                Some(element) => decode_chars(&element, endian)?,
                None => Vec::new(),
            };
            MatValue::Char(CharArray { dims, data })
        }
        MatClass::Struct => MatValue::Struct(parse_struct(&mut reader, dims, count, endian)?),
        MatClass::Cell => {
            reader.ensure_room(count, &name)?;
            let mut cells = Vec::with_capacity(count);
            for _ in 0..count {
                let element = reader.expect_element("cell")?;
                cells.push(parse_nested(&element, endian)?);
            }
            MatValue::Cell(CellArray { dims, cells })
        }
        other => {
            log::warn!("Array '{}' has unsupported class {:?}", name, other);
            MatValue::Unsupported(other)
        }
    };

    Ok((name, value))
}

fn parse_struct(
    reader: &mut ElementReader<'_>,
    dims: Vec<usize>,
    count: usize,
    endian: Endian,
) -> Result<StructArray> {
    let name_len_element = reader.expect_element("field name length")?;
    let name_len = decode_numeric(&name_len_element, endian)?
        .first()
        .copied()
        .unwrap_or(0.0) as usize;
    let names_element = reader.expect_element("field names")?;

    let field_names: Vec<String> = if name_len == 0 {
        Vec::new()
    } else {
        names_element
            .data
            .chunks(name_len)
            .map(|chunk| {
                let end = chunk.iter().position(|&b| b == 0).unwrap_or(chunk.len());
                String::from_utf8_lossy(&chunk[..end]).to_string()
            })
            .collect()
    };

    // A fieldless struct stores nothing per element
    if field_names.is_empty() {
        return Ok(StructArray {
            dims,
            field_names,
            elements: Vec::new(),
        });
    }
    let nested = count.checked_mul(field_names.len()).ok_or_else(|| {
        Spike2Error::ParseError(format!("struct dimensions {:?} overflow", dims))
    })?;
    reader.ensure_room(nested, "struct")?;

    let mut elements = Vec::with_capacity(count);
    for _ in 0..count {
        let mut fields = Vec::with_capacity(field_names.len());
        for field in &field_names {
            let element = reader.expect_element(field)?;
            fields.push(parse_nested(&element, endian)?);
        }
        elements.push(fields);
    }

    Ok(StructArray {
        dims,
        field_names,
        elements,
    })
}

fn parse_nested(element: &Element<'_>, endian: Endian) -> Result<MatValue> {
    if element.data_type != MI_MATRIX {
        return Err(Spike2Error::ParseError(format!(
            "expected a nested array element, found type {}",
            element.data_type
        )));
    }
    parse_matrix(element.data, endian).map(|(_, value)| value)
}

fn decode_numeric(element: &Element<'_>, endian: Endian) -> Result<Vec<f64>> {
    let data = element.data;
    let values = match element.data_type {
        MI_INT8 => data.iter().map(|&b| b as i8 as f64).collect(),
        MI_UINT8 | MI_UTF8 => data.iter().map(|&b| b as f64).collect(),
        MI_INT16 => data
            .chunks_exact(2)
            .map(|c| endian.u16(c) as i16 as f64)
            .collect(),
        MI_UINT16 | MI_UTF16 => data.chunks_exact(2).map(|c| endian.u16(c) as f64).collect(),
        MI_INT32 => data
            .chunks_exact(4)
            .map(|c| endian.u32(c) as i32 as f64)
            .collect(),
        MI_UINT32 | MI_UTF32 => data.chunks_exact(4).map(|c| endian.u32(c) as f64).collect(),
        MI_SINGLE => data.chunks_exact(4).map(|c| endian.f32(c) as f64).collect(),
        MI_DOUBLE => data.chunks_exact(8).map(|c| endian.f64(c)).collect(),
        MI_INT64 => data
            .chunks_exact(8)
            .map(|c| endian.u64(c) as i64 as f64)
            .collect(),
        MI_UINT64 => data.chunks_exact(8).map(|c| endian.u64(c) as f64).collect(),
        other => {
            return Err(Spike2Error::ParseError(format!(
                "data type {} is not numeric",
                other
            )))
        }
    };
    Ok(values)
}

fn decode_chars(element: &Element<'_>, endian: Endian) -> Result<Vec<char>> {
    if element.data_type == MI_UTF8 {
        return Ok(String::from_utf8_lossy(element.data).chars().collect());
    }
    let codes = decode_numeric(element, endian)?;
    Ok(codes
        .into_iter()
        .map(|code| char::from_u32(code as u32).unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect())
}

/// Storage indices of a column-major array, visited in row-major order
fn row_major_order(dims: &[usize], len: usize) -> Vec<usize> {
    let dims: Vec<usize> = dims.iter().copied().filter(|&d| d > 0).collect();
    if dims.len() < 2 || dims.iter().product::<usize>() != len {
        return (0..len).collect();
    }

    // Column-major strides
    let mut strides = vec![1usize; dims.len()];
    for axis in 1..dims.len() {
        strides[axis] = strides[axis - 1] * dims[axis - 1];
    }

    let mut order = Vec::with_capacity(len);
    let mut index = vec![0usize; dims.len()];
    for _ in 0..len {
        order.push(index.iter().zip(&strides).map(|(i, s)| i * s).sum());
        // Increment the last axis fastest
        for axis in (0..dims.len()).rev() {
            index[axis] += 1;
            if index[axis] < dims[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
    order
}

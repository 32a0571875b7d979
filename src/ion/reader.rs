//! Lazy binary Ion document reader.
//!
//! A single-cursor, pull-based state machine: the caller drives it with
//! [`IonReader::advance`], enters containers with [`IonReader::step_in`] and
//! leaves them with [`IonReader::step_out`]. Values are never materialized
//! ahead of need; scalar payloads are decoded only when one of the typed
//! accessors is called, and unconsumed values are skipped over byte-exactly.
//!
//! Reference: <https://amazon-ion.github.io/ion-docs/docs/binary.html>

use std::io::{Read, Seek};

use log::trace;

use crate::error::{Error, Result};
use crate::io::{ByteCursor, UNBOUNDED};
use crate::ion::symtab::{
    CatalogItem, SID_IMPORTS, SID_ION_1_0, SID_ION_SYMBOL_TABLE, SID_MAX_ID, SID_NAME,
    SID_VERSION, SymbolTable,
};
use crate::ion::varint;

/// Ion binary version marker payload (follows the zero-length annotation tag).
const VERSION_MARKER: [u8; 3] = [0x01, 0x00, 0xEA];

const LEN_IS_VAR_LEN: u8 = 14;
const LEN_IS_NULL: u8 = 15;

/// Ion type codes (high nibble of the type-tag byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IonType {
    Null = 0,
    Bool = 1,
    PosInt = 2,
    NegInt = 3,
    Float = 4,
    Decimal = 5,
    Timestamp = 6,
    Symbol = 7,
    String = 8,
    Clob = 9,
    Blob = 10,
    List = 11,
    Sexp = 12,
    Struct = 13,
    Annotation = 14,
}

impl IonType {
    fn from_nibble(n: u8) -> Option<Self> {
        match n {
            0 => Some(IonType::Null),
            1 => Some(IonType::Bool),
            2 => Some(IonType::PosInt),
            3 => Some(IonType::NegInt),
            4 => Some(IonType::Float),
            5 => Some(IonType::Decimal),
            6 => Some(IonType::Timestamp),
            7 => Some(IonType::Symbol),
            8 => Some(IonType::String),
            9 => Some(IonType::Clob),
            10 => Some(IonType::Blob),
            11 => Some(IonType::List),
            12 => Some(IonType::Sexp),
            13 => Some(IonType::Struct),
            14 => Some(IonType::Annotation),
            _ => None, // Reserved (15)
        }
    }

    fn is_container(self) -> bool {
        matches!(self, IonType::Struct | IonType::List | IonType::Sexp)
    }
}

/// A lazily materialized scalar payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Decimal(f64),
    Symbol(u64),
    String(String),
    Blob(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    /// Inside a struct, a field id precedes the next type tag.
    BeforeField,
    BeforeTypeId,
    BeforeValue,
    AfterValue,
    Eof,
}

/// One entry per currently open container.
struct ContainerRec {
    /// Absolute offset of the first byte after the container.
    end_pos: u64,
    /// Container type of the *enclosing* scope, restored on exit.
    parent: Option<IonType>,
    /// Byte budget of the enclosing scope, restored on exit.
    remaining: i64,
}

/// Streaming reader over one binary Ion document.
pub struct IonReader<R> {
    cursor: ByteCursor<R>,
    init_pos: u64,

    state: ParserState,
    eof: bool,
    need_advance: bool,
    is_in_struct: bool,
    parent_type: Option<IonType>,
    container_stack: Vec<ContainerRec>,

    value_type: Option<IonType>,
    value_len: u64,
    value_is_null: bool,
    value_field_id: Option<u64>,
    value: Option<Scalar>,
    annotations: Vec<u64>,

    symbols: SymbolTable,
    catalog: Vec<CatalogItem>,
    did_imports: bool,
}

impl<R: Read + Seek> IonReader<R> {
    pub fn new(stream: R) -> Result<Self> {
        let mut cursor = ByteCursor::new(stream)?;
        let init_pos = cursor.position()?;
        let mut reader = Self {
            cursor,
            init_pos,
            state: ParserState::BeforeTypeId,
            eof: false,
            need_advance: true,
            is_in_struct: false,
            parent_type: None,
            container_stack: Vec::new(),
            value_type: None,
            value_len: 0,
            value_is_null: false,
            value_field_id: None,
            value: None,
            annotations: Vec::new(),
            symbols: SymbolTable::new(),
            catalog: Vec::new(),
            did_imports: false,
        };
        reader.clear_value();
        Ok(reader)
    }

    /// Rewind to the initial stream position and restart the state machine.
    /// Imported symbols survive a reset; ids stay stable.
    pub fn reset(&mut self) -> Result<()> {
        self.state = ParserState::BeforeTypeId;
        self.need_advance = true;
        self.eof = false;
        self.is_in_struct = false;
        self.parent_type = None;
        self.container_stack.clear();
        self.cursor.set_remaining(UNBOUNDED);
        self.cursor.seek_to(self.init_pos)?;
        self.clear_value();
        Ok(())
    }

    /// Register a shared-symbol catalog that document imports may resolve
    /// against.
    pub fn add_catalog_item(&mut self, item: CatalogItem) {
        self.catalog.push(item);
    }

    /// True if another sibling value is available at the current nesting
    /// level. Consumes top-level version markers and symbol-table updates
    /// internally; they are never surfaced.
    pub fn has_next(&mut self) -> Result<bool> {
        while self.need_advance && !self.eof {
            self.advance_raw()?;
            if self.container_stack.is_empty() && !self.value_is_null {
                if self.value_type == Some(IonType::Symbol) {
                    if self.value == Some(Scalar::Symbol(SID_ION_1_0)) {
                        self.need_advance = true;
                    }
                } else if self.value_type == Some(IonType::Struct)
                    && self.annotations.contains(&SID_ION_SYMBOL_TABLE)
                {
                    self.parse_symbol_table()?;
                    self.need_advance = true;
                }
            }
        }
        Ok(!self.eof)
    }

    /// Move to the next sibling value and return its type, or `None` at the
    /// end of the current scope.
    pub fn advance(&mut self) -> Result<Option<IonType>> {
        if self.has_next()? {
            self.need_advance = true;
            Ok(self.value_type)
        } else {
            Ok(None)
        }
    }

    fn advance_raw(&mut self) -> Result<()> {
        self.clear_value();
        while self.value_type.is_none() && !self.eof {
            self.need_advance = false;
            match self.state {
                ParserState::BeforeField => {
                    self.value_field_id = self.read_field_id()?;
                    if self.value_field_id.is_some() {
                        self.state = ParserState::BeforeTypeId;
                    } else {
                        self.eof = true;
                    }
                }
                ParserState::BeforeTypeId => {
                    self.state = ParserState::BeforeValue;
                    self.value_type = self.read_type_id()?;
                    match self.value_type {
                        None => {
                            self.state = ParserState::Eof;
                            self.eof = true;
                        }
                        Some(IonType::Annotation) => {
                            if self.value_len == 0 {
                                self.check_version_marker()?;
                            } else {
                                self.load_annotations()?;
                            }
                        }
                        _ => {}
                    }
                }
                ParserState::BeforeValue => {
                    self.cursor.skip(self.value_len)?;
                    self.state = ParserState::AfterValue;
                }
                ParserState::AfterValue => {
                    self.state = if self.is_in_struct {
                        ParserState::BeforeField
                    } else {
                        ParserState::BeforeTypeId
                    };
                }
                ParserState::Eof => {
                    self.eof = true;
                }
            }
        }
        Ok(())
    }

    /// Enter the current struct/list/sexp. Only legal on a non-null
    /// container that has not been consumed yet.
    pub fn step_in(&mut self) -> Result<()> {
        match self.value_type {
            Some(t) if t.is_container() && !self.eof => {}
            _ => {
                return Err(Error::MalformedDocument(
                    "step_in on a non-container value".into(),
                ));
            }
        }
        if self.value_is_null {
            return Err(Error::MalformedDocument(
                "step_in on a null container".into(),
            ));
        }
        if self.state != ParserState::BeforeValue {
            return Err(Error::MalformedDocument(
                "step_in on a consumed container".into(),
            ));
        }

        let mut next_remaining = self.cursor.remaining();
        if next_remaining != UNBOUNDED {
            next_remaining = (next_remaining - self.value_len as i64).max(0);
        }
        self.container_stack.push(ContainerRec {
            end_pos: self.cursor.position()? + self.value_len,
            parent: self.parent_type,
            remaining: next_remaining,
        });

        self.is_in_struct = self.value_type == Some(IonType::Struct);
        self.state = if self.is_in_struct {
            ParserState::BeforeField
        } else {
            ParserState::BeforeTypeId
        };
        self.cursor.set_remaining(self.value_len as i64);
        self.parent_type = self.value_type;
        self.clear_value();
        self.need_advance = true;
        Ok(())
    }

    /// Leave the current container, skipping any unconsumed trailing bytes,
    /// and restore the enclosing scope exactly as recorded on entry.
    pub fn step_out(&mut self) -> Result<()> {
        let rec = self
            .container_stack
            .pop()
            .ok_or_else(|| Error::MalformedDocument("step_out at top level".into()))?;

        self.eof = false;
        self.parent_type = rec.parent;
        if rec.parent == Some(IonType::Struct) {
            self.is_in_struct = true;
            self.state = ParserState::BeforeField;
        } else {
            self.is_in_struct = false;
            self.state = ParserState::BeforeTypeId;
        }
        self.need_advance = true;
        self.clear_value();

        let pos = self.cursor.position()?;
        if rec.end_pos > pos {
            self.cursor.skip(rec.end_pos - pos)?;
        } else if rec.end_pos != pos {
            return Err(Error::MalformedDocument("container overrun".into()));
        }
        self.cursor.set_remaining(rec.remaining);
        Ok(())
    }

    /// Nesting depth (0 = top level).
    pub fn depth(&self) -> usize {
        self.container_stack.len()
    }

    // --- Field-level reads ---

    fn read_field_id(&mut self) -> Result<Option<u64>> {
        let remaining = self.cursor.remaining();
        if remaining != UNBOUNDED && remaining < 1 {
            return Ok(None);
        }

        match varint::read_varuint(&mut self.cursor) {
            Ok(id) => Ok(Some(id)),
            // Running off the end of the stream means no more fields; a
            // budget violation mid-id stays an error.
            Err(Error::TruncatedInput) => {
                if self.cursor.at_end()? {
                    Ok(None)
                } else {
                    Err(Error::TruncatedInput)
                }
            }
            Err(e) => Err(e),
        }
    }

    fn read_type_id(&mut self) -> Result<Option<IonType>> {
        let remaining = self.cursor.remaining();
        if remaining != UNBOUNDED {
            if remaining < 1 {
                return Ok(None);
            }
            self.cursor.charge(1)?;
        }
        let b = match self.cursor.try_read_byte()? {
            Some(b) => b,
            None => return Ok(None),
        };

        let type_nibble = b >> 4;
        let mut len = (b & 0x0F) as u64;

        if len == LEN_IS_VAR_LEN as u64 {
            len = varint::read_varuint(&mut self.cursor)?;
        } else if len == LEN_IS_NULL as u64 {
            len = 0;
            self.value_is_null = true;
            self.state = ParserState::AfterValue;
        } else if type_nibble == IonType::Null as u8 {
            // The null type admits no other length nibble.
            return Err(Error::MalformedDocument("null type with a length".into()));
        } else if type_nibble == IonType::Bool as u8 {
            if len > 1 {
                return Err(Error::MalformedDocument("boolean length out of range".into()));
            }
            self.value = Some(Scalar::Bool(len == 1));
            len = 0;
            self.state = ParserState::AfterValue;
        } else if type_nibble == IonType::Struct as u8 && len == 1 {
            // Sorted struct: the true length follows.
            len = varint::read_varuint(&mut self.cursor)?;
        }

        self.value_len = len;
        IonType::from_nibble(type_nibble)
            .ok_or_else(|| Error::MalformedDocument("reserved type tag".into()))
            .map(Some)
    }

    fn load_annotations(&mut self) -> Result<()> {
        let len = varint::read_varuint(&mut self.cursor)?;
        let max_pos = self.cursor.position()? + len;
        while self.cursor.position()? < max_pos {
            let sid = varint::read_varuint(&mut self.cursor)?;
            self.annotations.push(sid);
        }
        self.value_type = self.read_type_id()?;
        if self.value_type.is_none() {
            return Err(Error::TruncatedInput);
        }
        Ok(())
    }

    fn check_version_marker(&mut self) -> Result<()> {
        for expected in VERSION_MARKER {
            if self.cursor.read_byte()? != expected {
                return Err(Error::MalformedDocument("unknown version marker".into()));
            }
        }
        self.value_len = 0;
        self.value_type = Some(IonType::Symbol);
        self.value = Some(Scalar::Symbol(SID_ION_1_0));
        self.value_is_null = false;
        self.value_field_id = None;
        self.state = ParserState::AfterValue;
        Ok(())
    }

    fn clear_value(&mut self) {
        self.value_type = None;
        self.value = None;
        self.value_is_null = false;
        self.value_field_id = None;
        self.annotations.clear();
    }

    // --- Symbol-table updates ---

    fn parse_symbol_table(&mut self) -> Result<()> {
        self.advance()?;
        if self.value_type != Some(IonType::Struct) {
            return Err(Error::MalformedDocument(
                "symbol table update is not a struct".into(),
            ));
        }

        // Import batches are applied at most once per reader.
        if self.did_imports {
            return Ok(());
        }
        trace!("applying symbol table update");

        self.step_in()?;
        while let Some(field_type) = self.advance()? {
            if !self.value_is_null {
                if self.value_field_id != Some(SID_IMPORTS) {
                    return Err(Error::MalformedDocument(
                        "unsupported symbol table field".into(),
                    ));
                }
                if field_type == IonType::List {
                    self.gather_imports()?;
                }
            }
        }
        self.step_out()?;
        self.did_imports = true;
        Ok(())
    }

    fn gather_imports(&mut self) -> Result<()> {
        self.step_in()?;
        while let Some(t) = self.advance()? {
            if !self.value_is_null && t == IonType::Struct {
                self.read_import()?;
            }
        }
        self.step_out()
    }

    fn read_import(&mut self) -> Result<()> {
        let mut name = String::new();
        let mut version: i64 = -1;
        let mut max_id: i64 = -1;

        self.step_in()?;
        while self.advance()?.is_some() {
            if !self.value_is_null {
                match self.value_field_id {
                    Some(SID_NAME) => name = self.string_value()?,
                    Some(SID_VERSION) => version = self.int_value()?,
                    Some(SID_MAX_ID) => max_id = self.int_value()?,
                    _ => {}
                }
            }
        }
        self.step_out()?;

        if name.is_empty() || name == "$ion" {
            return Ok(());
        }
        let version = version.max(1) as u32;

        let item = self.catalog.iter().position(|c| c.name == name);
        if max_id < 0 {
            match item {
                Some(i) if self.catalog[i].version == version => {
                    max_id = self.catalog[i].symbols.len() as i64;
                }
                _ => {
                    return Err(Error::MalformedDocument(format!(
                        "import {name} lacks max_id"
                    )));
                }
            }
        }
        let max_id = max_id as usize;

        match item {
            Some(i) => {
                let known = self.catalog[i].symbols.len();
                self.symbols.import_catalog(&self.catalog[i], max_id.min(known));
                if known < max_id {
                    self.symbols
                        .import_unknown(&format!("{name}-unknown"), max_id - known);
                }
            }
            None => self.symbols.import_unknown(&name, max_id),
        }
        trace!("imported {max_id} symbols from catalog {name}");
        Ok(())
    }

    // --- Typed accessors ---

    fn prepare_value(&mut self) -> Result<()> {
        if self.value.is_none() {
            self.load_scalar()?;
        }
        Ok(())
    }

    fn load_scalar(&mut self) -> Result<()> {
        match self.value_type {
            Some(
                IonType::Null
                | IonType::Bool
                | IonType::PosInt
                | IonType::NegInt
                | IonType::Float
                | IonType::Decimal
                | IonType::Timestamp
                | IonType::Symbol
                | IonType::String,
            ) => {}
            _ => return Ok(()),
        }

        if self.value_is_null {
            self.value = None;
            return Ok(());
        }

        match self.value_type.unwrap() {
            IonType::String => {
                let bytes = self.cursor.read_exact(self.value_len as usize)?;
                self.value = Some(Scalar::String(String::from_utf8(bytes)?));
            }
            t @ (IonType::PosInt | IonType::NegInt | IonType::Symbol) => {
                let magnitude = if self.value_len == 0 {
                    0
                } else {
                    if self.value_len > 4 {
                        return Err(Error::IntegerOverflow);
                    }
                    let bytes = self.cursor.read_exact(self.value_len as usize)?;
                    bytes.iter().fold(0u64, |v, &b| (v << 8) | b as u64)
                };
                self.value = Some(match t {
                    IonType::Symbol => Scalar::Symbol(magnitude),
                    IonType::NegInt => Scalar::Int(-(magnitude as i64)),
                    _ => Scalar::Int(magnitude as i64),
                });
            }
            IonType::Decimal => {
                let d = self.read_decimal()?;
                self.value = Some(Scalar::Decimal(d));
            }
            _ => {}
        }

        self.state = ParserState::AfterValue;
        Ok(())
    }

    fn read_decimal(&mut self) -> Result<f64> {
        if self.value_len == 0 {
            return Ok(0.0);
        }

        let saved = self.cursor.remaining();
        let outer = if saved == UNBOUNDED {
            UNBOUNDED
        } else {
            saved - self.value_len as i64
        };
        self.cursor.set_remaining(self.value_len as i64);

        let exponent = varint::read_varint(&mut self.cursor)?;
        let magnitude_len = self.cursor.remaining();
        if magnitude_len <= 0 {
            return Err(Error::MalformedDocument("decimal with no magnitude".into()));
        }
        if magnitude_len > 8 {
            return Err(Error::IntegerOverflow);
        }

        let mut bytes = self.cursor.read_exact(magnitude_len as usize)?;
        let signed = bytes[0] & 0x80 != 0;
        bytes[0] &= 0x7F;
        let magnitude = bytes.iter().fold(0u64, |v, &b| (v << 8) | b as u64);

        self.cursor.set_remaining(outer);

        let result = magnitude as f64 * 10f64.powi(exponent as i32);
        Ok(if signed { -result } else { result })
    }

    /// Integer value of the current pos/neg int.
    pub fn int_value(&mut self) -> Result<i64> {
        match self.value_type {
            Some(IonType::PosInt | IonType::NegInt) => {}
            _ => return Err(Error::MalformedDocument("not an int".into())),
        }
        self.prepare_value()?;
        match self.value {
            Some(Scalar::Int(v)) => Ok(v),
            _ => Ok(0),
        }
    }

    /// String value of the current string (empty for null.string).
    pub fn string_value(&mut self) -> Result<String> {
        if self.value_type != Some(IonType::String) {
            return Err(Error::MalformedDocument("not a string".into()));
        }
        if self.value_is_null {
            return Ok(String::new());
        }
        self.prepare_value()?;
        match &self.value {
            Some(Scalar::String(s)) => Ok(s.clone()),
            _ => Ok(String::new()),
        }
    }

    /// Boolean value of the current bool.
    pub fn bool_value(&mut self) -> Result<bool> {
        if self.value_type != Some(IonType::Bool) {
            return Err(Error::MalformedDocument("not a bool".into()));
        }
        match self.value {
            Some(Scalar::Bool(b)) => Ok(b),
            _ => Ok(false),
        }
    }

    /// Resolved text of the current symbol, with a `SYMBOL#{id}` fallback
    /// for ids the symbol table cannot resolve.
    pub fn symbol_value(&mut self) -> Result<String> {
        if self.value_type != Some(IonType::Symbol) {
            return Err(Error::MalformedDocument("not a symbol".into()));
        }
        self.prepare_value()?;
        let sid = match self.value {
            Some(Scalar::Symbol(sid)) => sid,
            _ => 0,
        };
        Ok(match self.symbols.lookup(sid) {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => format!("SYMBOL#{sid}"),
        })
    }

    /// Raw bytes of the current blob/clob; `None` for a null lob.
    pub fn lob_value(&mut self) -> Result<Option<Vec<u8>>> {
        match self.value_type {
            Some(IonType::Clob | IonType::Blob) => {}
            _ => return Err(Error::MalformedDocument("not a lob".into())),
        }
        if self.value_is_null {
            return Ok(None);
        }
        let bytes = self.cursor.read_exact(self.value_len as usize)?;
        self.state = ParserState::AfterValue;
        Ok(Some(bytes))
    }

    /// Decimal value as mantissa × 10^exponent.
    pub fn decimal_value(&mut self) -> Result<f64> {
        if self.value_type != Some(IonType::Decimal) {
            return Err(Error::MalformedDocument("not a decimal".into()));
        }
        self.prepare_value()?;
        match self.value {
            Some(Scalar::Decimal(d)) => Ok(d),
            _ => Ok(0.0),
        }
    }

    /// Name of the field owning the current value (inside a struct).
    pub fn field_name(&self) -> Option<&str> {
        self.symbols.lookup(self.value_field_id?)
    }

    /// Name of the first annotation on the current value, if any.
    pub fn type_name(&self) -> Option<&str> {
        self.symbols.lookup(*self.annotations.first()?)
    }

    // --- Diagnostics ---

    /// Render the whole document as indented text, one line per value.
    pub fn dump(&mut self) -> Result<Vec<String>> {
        self.reset()?;
        let mut lines = Vec::new();
        self.walk(None, "", &mut lines)?;
        Ok(lines)
    }

    fn walk(&mut self, parent: Option<IonType>, indent: &str, out: &mut Vec<String>) -> Result<()> {
        while self.has_next()? {
            let mut label = if parent == Some(IonType::Struct) {
                format!("{}:", self.field_name().unwrap_or(""))
            } else {
                String::new()
            };

            let t = match self.advance()? {
                Some(t) => t,
                None => break,
            };

            if matches!(t, IonType::Struct | IonType::List) {
                if !label.is_empty() {
                    out.push(format!("{indent}{label}"));
                }
                if let Some(type_name) = self.type_name() {
                    out.push(format!("{indent}{type_name}::"));
                }
                out.push(format!(
                    "{indent}{}",
                    if t == IonType::Struct { "{" } else { "[" }
                ));
                self.step_in()?;
                self.walk(Some(t), &format!("{indent}  "), out)?;
                self.step_out()?;
                out.push(format!(
                    "{indent}{}",
                    if t == IonType::Struct { "}" } else { "]" }
                ));
            } else {
                match t {
                    IonType::String => {
                        label.push_str(&format!("\"{}\"", self.string_value()?));
                    }
                    IonType::Clob | IonType::Blob => {
                        label.push_str(&format!("{{{}}}", render_lob(self.lob_value()?)));
                    }
                    IonType::PosInt => label.push_str(&self.int_value()?.to_string()),
                    IonType::Symbol => {
                        if let Some(type_name) = self.type_name() {
                            label.push_str(type_name);
                            label.push_str("::");
                        }
                        let symbol = self.symbol_value()?;
                        label.push_str(&symbol);
                    }
                    IonType::Decimal => label.push_str(&self.decimal_value()?.to_string()),
                    other => label.push_str(&format!("TID {}", other as u8)),
                }
                out.push(format!("{indent}{label}"));
            }
        }
        Ok(())
    }
}

fn render_lob(bytes: Option<Vec<u8>>) -> String {
    match bytes {
        None => "null".to_string(),
        Some(b) => b
            .iter()
            .map(|x| format!("{x:02x}"))
            .collect::<Vec<_>>()
            .join(" "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const BVM: [u8; 4] = [0xE0, 0x01, 0x00, 0xEA];

    fn reader(body: &[u8]) -> IonReader<Cursor<Vec<u8>>> {
        let mut data = BVM.to_vec();
        data.extend_from_slice(body);
        IonReader::new(Cursor::new(data)).unwrap()
    }

    #[test]
    fn test_struct_with_name_and_version() {
        // { name: "x", version: 3 } using system field ids 4 and 5
        let mut r = reader(&[
            0xD6, // struct, length 6
            0x84, 0x81, b'x', // name: "x"
            0x85, 0x21, 0x03, // version: 3
        ]);

        assert_eq!(r.advance().unwrap(), Some(IonType::Struct));
        r.step_in().unwrap();

        assert_eq!(r.advance().unwrap(), Some(IonType::String));
        assert_eq!(r.field_name(), Some("name"));
        assert_eq!(r.string_value().unwrap(), "x");

        assert_eq!(r.advance().unwrap(), Some(IonType::PosInt));
        assert_eq!(r.field_name(), Some("version"));
        assert_eq!(r.int_value().unwrap(), 3);

        assert_eq!(r.advance().unwrap(), None);
        r.step_out().unwrap();
        assert_eq!(r.advance().unwrap(), None);
    }

    #[test]
    fn test_step_over_equals_step_in_out() {
        // [ [1, 2], 42 ] - stepping over the inner list must land on 42
        // exactly like stepping in and straight back out.
        let body = [
            0xB7, // outer list, length 7
            0xB4, 0x21, 0x01, 0x21, 0x02, // [1, 2]
            0x21, 0x2A, // 42
        ];

        let mut over = reader(&body);
        assert_eq!(over.advance().unwrap(), Some(IonType::List));
        over.step_in().unwrap();
        assert_eq!(over.advance().unwrap(), Some(IonType::List));
        assert_eq!(over.advance().unwrap(), Some(IonType::PosInt));
        let skipped = over.int_value().unwrap();

        let mut inout = reader(&body);
        assert_eq!(inout.advance().unwrap(), Some(IonType::List));
        inout.step_in().unwrap();
        assert_eq!(inout.advance().unwrap(), Some(IonType::List));
        inout.step_in().unwrap();
        inout.step_out().unwrap();
        assert_eq!(inout.advance().unwrap(), Some(IonType::PosInt));
        assert_eq!(inout.int_value().unwrap(), skipped);
        assert_eq!(skipped, 42);
    }

    #[test]
    fn test_partially_consumed_container() {
        // Stepping out after reading only the first element skips the rest.
        let mut r = reader(&[
            0xB6, 0x21, 0x01, 0x21, 0x02, 0x21, 0x03, // [1, 2, 3]
            0x21, 0x63, // 99
        ]);
        assert_eq!(r.advance().unwrap(), Some(IonType::List));
        r.step_in().unwrap();
        assert_eq!(r.advance().unwrap(), Some(IonType::PosInt));
        assert_eq!(r.int_value().unwrap(), 1);
        r.step_out().unwrap();
        assert_eq!(r.advance().unwrap(), Some(IonType::PosInt));
        assert_eq!(r.int_value().unwrap(), 99);
    }

    #[test]
    fn test_scalars() {
        let mut r = reader(&[
            0x11, // true
            0x31, 0x2A, // -42
            0x52, 0xC1, 0x07, // 0.7 (7 * 10^-1)
            0x8F, // null.string
            0xA3, 0x01, 0x02, 0x03, // blob
            0xAF, // null.blob
        ]);
        assert_eq!(r.advance().unwrap(), Some(IonType::Bool));
        assert!(r.bool_value().unwrap());

        assert_eq!(r.advance().unwrap(), Some(IonType::NegInt));
        assert_eq!(r.int_value().unwrap(), -42);

        assert_eq!(r.advance().unwrap(), Some(IonType::Decimal));
        let d = r.decimal_value().unwrap();
        assert!((d - 0.7).abs() < 1e-9);

        assert_eq!(r.advance().unwrap(), Some(IonType::String));
        assert_eq!(r.string_value().unwrap(), "");

        assert_eq!(r.advance().unwrap(), Some(IonType::Blob));
        assert_eq!(r.lob_value().unwrap(), Some(vec![1, 2, 3]));

        assert_eq!(r.advance().unwrap(), Some(IonType::Blob));
        assert_eq!(r.lob_value().unwrap(), None);
    }

    #[test]
    fn test_var_length_value() {
        let mut body = vec![0x8E, 0x94]; // string, var length 20
        body.extend_from_slice(&[b'a'; 20]);
        let mut r = reader(&body);
        assert_eq!(r.advance().unwrap(), Some(IonType::String));
        assert_eq!(r.string_value().unwrap(), "a".repeat(20));
    }

    #[test]
    fn test_unresolved_symbol_fallback() {
        let mut r = reader(&[0x71, 0x2A]); // symbol 42, nothing imported
        assert_eq!(r.advance().unwrap(), Some(IonType::Symbol));
        assert_eq!(r.symbol_value().unwrap(), "SYMBOL#42");
    }

    #[test]
    fn test_int_too_long() {
        let mut r = reader(&[0x25, 0x01, 0x02, 0x03, 0x04, 0x05]);
        assert_eq!(r.advance().unwrap(), Some(IonType::PosInt));
        assert!(matches!(r.int_value(), Err(Error::IntegerOverflow)));
    }

    #[test]
    fn test_truncated_container() {
        let mut r = reader(&[0xB6, 0x21, 0x01]); // declares 6, has 2
        assert_eq!(r.advance().unwrap(), Some(IonType::List));
        r.step_in().unwrap();
        assert_eq!(r.advance().unwrap(), Some(IonType::PosInt));
        assert_eq!(r.int_value().unwrap(), 1);
        // skipping to the declared end runs past the stream
        assert!(matches!(r.step_out(), Err(Error::TruncatedInput)));
    }

    #[test]
    fn test_bad_version_marker() {
        let mut r = IonReader::new(Cursor::new(vec![0xE0, 0x01, 0x00, 0xEB])).unwrap();
        assert!(r.has_next().is_err());
    }

    /// Annotated symbol-table struct importing two names from a catalog.
    fn symbol_table_update() -> Vec<u8> {
        vec![
            0xEE, 0x8F, // annotation wrapper, length 15
            0x81, 0x83, // one annotation: $ion_symbol_table
            0xDC, // struct, length 12
            0x86, // imports:
            0xBA, // list, length 10
            0xD9, // struct, length 9
            0x84, 0x81, b'X', // name: "X"
            0x85, 0x21, 0x01, // version: 1
            0x88, 0x21, 0x02, // max_id: 2
        ]
    }

    #[test]
    fn test_symbol_table_import() {
        let mut body = symbol_table_update();
        body.extend_from_slice(&[0x71, 0x0A, 0x71, 0x0B]); // symbols 10, 11
        let mut r = reader(&body);
        r.add_catalog_item(CatalogItem::new(
            "X",
            1,
            vec!["alpha".into(), "beta".into()],
        ));

        assert_eq!(r.advance().unwrap(), Some(IonType::Symbol));
        assert_eq!(r.symbol_value().unwrap(), "alpha");
        assert_eq!(r.advance().unwrap(), Some(IonType::Symbol));
        assert_eq!(r.symbol_value().unwrap(), "beta");
    }

    #[test]
    fn test_symbol_table_import_is_applied_once() {
        // Two identical updates; the second must not duplicate ids.
        let mut body = symbol_table_update();
        body.extend_from_slice(&symbol_table_update());
        body.extend_from_slice(&[0x71, 0x0B, 0x71, 0x0C]); // symbols 11, 12
        let mut r = reader(&body);
        r.add_catalog_item(CatalogItem::new(
            "X",
            1,
            vec!["alpha".into(), "beta".into()],
        ));

        assert_eq!(r.advance().unwrap(), Some(IonType::Symbol));
        assert_eq!(r.symbol_value().unwrap(), "beta");
        assert_eq!(r.advance().unwrap(), Some(IonType::Symbol));
        assert_eq!(r.symbol_value().unwrap(), "SYMBOL#12");
    }

    #[test]
    fn test_unknown_import_synthesizes_placeholders() {
        let mut body = symbol_table_update();
        body.extend_from_slice(&[0x71, 0x0A]);
        let mut r = reader(&body); // no catalog registered
        assert_eq!(r.advance().unwrap(), Some(IonType::Symbol));
        assert_eq!(r.symbol_value().unwrap(), "X#1");
    }

    #[test]
    fn test_annotation_surfaces_as_type_name() {
        let mut body = symbol_table_update();
        // alpha::{} (annotated empty struct)
        body.extend_from_slice(&[0xE3, 0x81, 0x8A, 0xD0]);
        let mut r = reader(&body);
        r.add_catalog_item(CatalogItem::new(
            "X",
            1,
            vec!["alpha".into(), "beta".into()],
        ));
        assert_eq!(r.advance().unwrap(), Some(IonType::Struct));
        assert_eq!(r.type_name(), Some("alpha"));
    }

    #[test]
    fn test_reset_replays_document() {
        let body = [0x21, 0x07];
        let mut r = reader(&body);
        assert_eq!(r.advance().unwrap(), Some(IonType::PosInt));
        assert_eq!(r.int_value().unwrap(), 7);
        r.reset().unwrap();
        assert_eq!(r.advance().unwrap(), Some(IonType::PosInt));
        assert_eq!(r.int_value().unwrap(), 7);
    }

    #[test]
    fn test_dump_renders_nested_document() {
        let mut r = reader(&[
            0xD6, // struct
            0x84, 0x81, b'x', // name: "x"
            0x85, 0x21, 0x03, // version: 3
        ]);
        let lines = r.dump().unwrap();
        assert_eq!(
            lines,
            vec!["{", "  name:\"x\"", "  version:3", "}"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        );
    }
}

//! Streaming document interfaces and their in-memory implementations.
//!
//! Codecs never see a concrete document representation: they write through a
//! [`DocumentSink`] and read through a [`DocumentSource`]. [`TreeWriter`] and
//! [`TreeReader`] back both with the [`Value`] tree.

use crate::error::WireError;
use crate::value::{Document, Value, ValueKind};

/// Receives a document as a stream of scopes and scalars.
///
/// Inside a document every value is preceded by [`DocumentSink::begin_element`];
/// inside an array values are written directly.
pub trait DocumentSink {
    fn begin_document(&mut self) -> Result<(), WireError>;

    fn begin_element(&mut self, name: &str) -> Result<(), WireError>;

    fn end_document(&mut self) -> Result<(), WireError>;

    fn begin_array(&mut self) -> Result<(), WireError>;

    fn end_array(&mut self) -> Result<(), WireError>;

    /// Writes a non-container value.
    fn write_scalar(&mut self, value: Value) -> Result<(), WireError>;
}

/// Produces a document as a stream of scopes and scalars.
///
/// Every value yielded by [`DocumentSource::next_element`] or
/// [`DocumentSource::next_item`] must be consumed (read, entered, or skipped)
/// before advancing.
pub trait DocumentSource {
    /// Kind of the next value.
    fn peek_kind(&mut self) -> Result<ValueKind, WireError>;

    fn begin_document(&mut self) -> Result<(), WireError>;

    /// Advances to the next element, returning its name, or `None` when the
    /// current document is finished.
    fn next_element(&mut self) -> Result<Option<String>, WireError>;

    fn begin_array(&mut self) -> Result<(), WireError>;

    /// Advances to the next array item; false when the array is finished.
    fn next_item(&mut self) -> Result<bool, WireError>;

    fn read_scalar(&mut self) -> Result<Value, WireError>;

    /// Discards the next value, including any nested content.
    fn skip(&mut self) -> Result<(), WireError>;

    /// Discards whatever is left of the innermost open document or array and
    /// closes it.
    fn skip_to_end(&mut self) -> Result<(), WireError>;
}

enum WriteFrame {
    Document { doc: Document, pending: Option<String> },
    Array(Vec<Value>),
}

/// A [`DocumentSink`] that builds a [`Value`] tree.
#[derive(Default)]
pub struct TreeWriter {
    stack: Vec<WriteFrame>,
    root: Option<Value>,
}

impl TreeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn place(&mut self, value: Value) -> Result<(), WireError> {
        match self.stack.last_mut() {
            None => {
                self.root = Some(value);
                Ok(())
            }
            Some(WriteFrame::Document { doc, pending }) => {
                let name = pending.take().ok_or(WireError::MissingElementName)?;
                doc.insert(name, value);
                Ok(())
            }
            Some(WriteFrame::Array(items)) => {
                items.push(value);
                Ok(())
            }
        }
    }

    /// Returns the completed value.
    pub fn into_value(self) -> Result<Value, WireError> {
        if !self.stack.is_empty() {
            return Err(WireError::Unbalanced("scope left open"));
        }
        self.root.ok_or(WireError::Exhausted)
    }

    /// Returns the completed value, which must be a document.
    pub fn into_document(self) -> Result<Document, WireError> {
        match self.into_value()? {
            Value::Document(doc) => Ok(doc),
            other => Err(WireError::UnexpectedKind {
                expected: "document",
                found: other.kind().to_string(),
            }),
        }
    }
}

impl DocumentSink for TreeWriter {
    fn begin_document(&mut self) -> Result<(), WireError> {
        self.stack.push(WriteFrame::Document {
            doc: Document::new(),
            pending: None,
        });
        Ok(())
    }

    fn begin_element(&mut self, name: &str) -> Result<(), WireError> {
        match self.stack.last_mut() {
            Some(WriteFrame::Document { pending, .. }) => {
                *pending = Some(name.to_string());
                Ok(())
            }
            _ => Err(WireError::NameOutsideDocument),
        }
    }

    fn end_document(&mut self) -> Result<(), WireError> {
        match self.stack.pop() {
            Some(WriteFrame::Document { doc, .. }) => self.place(Value::Document(doc)),
            Some(frame) => {
                self.stack.push(frame);
                Err(WireError::Unbalanced("document"))
            }
            None => Err(WireError::Unbalanced("document")),
        }
    }

    fn begin_array(&mut self) -> Result<(), WireError> {
        self.stack.push(WriteFrame::Array(Vec::new()));
        Ok(())
    }

    fn end_array(&mut self) -> Result<(), WireError> {
        match self.stack.pop() {
            Some(WriteFrame::Array(items)) => self.place(Value::Array(items)),
            Some(frame) => {
                self.stack.push(frame);
                Err(WireError::Unbalanced("array"))
            }
            None => Err(WireError::Unbalanced("array")),
        }
    }

    fn write_scalar(&mut self, value: Value) -> Result<(), WireError> {
        let kind = value.kind();
        if kind.is_container() {
            return Err(WireError::ContainerAsScalar(kind));
        }
        self.place(value)
    }
}

enum ReadFrame {
    Document(indexmap::map::IntoIter<String, Value>),
    Array(std::vec::IntoIter<Value>),
}

/// A [`DocumentSource`] that walks an owned [`Value`] tree.
pub struct TreeReader {
    pending: Option<Value>,
    stack: Vec<ReadFrame>,
}

impl TreeReader {
    pub fn new(value: Value) -> Self {
        TreeReader {
            pending: Some(value),
            stack: Vec::new(),
        }
    }

    pub fn from_document(doc: Document) -> Self {
        Self::new(Value::Document(doc))
    }

    /// True once every value has been consumed and every scope closed.
    pub fn is_exhausted(&self) -> bool {
        self.pending.is_none() && self.stack.is_empty()
    }

    fn take_pending(&mut self) -> Result<Value, WireError> {
        self.pending.take().ok_or(WireError::Exhausted)
    }

    fn unexpected(&mut self, expected: &'static str, value: Value) -> WireError {
        let found = value.kind().to_string();
        self.pending = Some(value);
        WireError::UnexpectedKind { expected, found }
    }
}

impl DocumentSource for TreeReader {
    fn peek_kind(&mut self) -> Result<ValueKind, WireError> {
        self.pending
            .as_ref()
            .map(Value::kind)
            .ok_or(WireError::Exhausted)
    }

    fn begin_document(&mut self) -> Result<(), WireError> {
        match self.take_pending()? {
            Value::Document(doc) => {
                self.stack.push(ReadFrame::Document(doc.into_iter()));
                Ok(())
            }
            other => Err(self.unexpected("document", other)),
        }
    }

    fn next_element(&mut self) -> Result<Option<String>, WireError> {
        if self.pending.is_some() {
            return Err(WireError::ValueNotConsumed);
        }
        let Some(ReadFrame::Document(entries)) = self.stack.last_mut() else {
            return Err(WireError::Unbalanced("document"));
        };
        match entries.next() {
            Some((name, value)) => {
                self.pending = Some(value);
                Ok(Some(name))
            }
            None => {
                self.stack.pop();
                Ok(None)
            }
        }
    }

    fn begin_array(&mut self) -> Result<(), WireError> {
        match self.take_pending()? {
            Value::Array(items) => {
                self.stack.push(ReadFrame::Array(items.into_iter()));
                Ok(())
            }
            other => Err(self.unexpected("array", other)),
        }
    }

    fn next_item(&mut self) -> Result<bool, WireError> {
        if self.pending.is_some() {
            return Err(WireError::ValueNotConsumed);
        }
        let Some(ReadFrame::Array(items)) = self.stack.last_mut() else {
            return Err(WireError::Unbalanced("array"));
        };
        match items.next() {
            Some(value) => {
                self.pending = Some(value);
                Ok(true)
            }
            None => {
                self.stack.pop();
                Ok(false)
            }
        }
    }

    fn read_scalar(&mut self) -> Result<Value, WireError> {
        let value = self.take_pending()?;
        if value.kind().is_container() {
            return Err(self.unexpected("scalar", value));
        }
        Ok(value)
    }

    fn skip(&mut self) -> Result<(), WireError> {
        self.take_pending().map(drop)
    }

    fn skip_to_end(&mut self) -> Result<(), WireError> {
        self.pending = None;
        self.stack
            .pop()
            .map(drop)
            .ok_or(WireError::Unbalanced("scope"))
    }
}

/// Streams a whole document into a sink.
pub fn write_document(sink: &mut dyn DocumentSink, doc: &Document) -> Result<(), WireError> {
    sink.begin_document()?;
    for (name, item) in doc.iter() {
        sink.begin_element(name)?;
        write_value(sink, item)?;
    }
    sink.end_document()
}

/// Streams a whole value into a sink.
pub fn write_value(sink: &mut dyn DocumentSink, value: &Value) -> Result<(), WireError> {
    match value {
        Value::Document(doc) => write_document(sink, doc),
        Value::Array(items) => {
            sink.begin_array()?;
            for item in items {
                write_value(sink, item)?;
            }
            sink.end_array()
        }
        scalar => sink.write_scalar(scalar.clone()),
    }
}

/// Reads the next whole value from a source.
pub fn read_value(source: &mut dyn DocumentSource) -> Result<Value, WireError> {
    match source.peek_kind()? {
        ValueKind::Document => {
            source.begin_document()?;
            let mut doc = Document::new();
            while let Some(name) = source.next_element()? {
                let item = read_value(source)?;
                doc.insert(name, item);
            }
            Ok(Value::Document(doc))
        }
        ValueKind::Array => {
            source.begin_array()?;
            let mut items = Vec::new();
            while source.next_item()? {
                items.push(read_value(source)?);
            }
            Ok(Value::Array(items))
        }
        _ => source.read_scalar(),
    }
}

//! Push adapter over `quick-xml`.
//!
//! `quick-xml` is a pull parser over a complete buffer, so the adapter keeps
//! the unconsumed tail of every chunk and re-reads it once more input
//! arrives. Only markup cut off by the end of the buffer is re-read. Text at
//! the end of the buffer is consumed, but its raw bytes are kept aside and
//! unescaped once the text is complete, so a split entity or UTF-8 sequence
//! is never decoded in halves. Consecutive text and CDATA events are
//! coalesced and delivered once, right before the next tag.
//!
//! A syntax error that is not at the end of the buffer is recorded and the
//! reader moves on past the offending markup.
//!
//! Events are reduced to the three the tree builder cares about: start tag
//! (with attributes), character data and end tag. Comments, processing
//! instructions, declarations and doctypes are dropped.

use crate::err::Result;
use log::{trace, warn};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::borrow::Cow;

/// Receiver of tokenizer events.
pub trait TokenSink {
    fn start_element(&mut self, name: &str, attributes: Vec<(String, String)>) -> Result<()>;
    fn characters(&mut self, text: &str) -> Result<()>;
    fn end_element(&mut self, name: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Start {
        name: String,
        attributes: Vec<(String, String)>,
    },
    Text(String),
    End(String),
}

/// Parse state that survives between chunks.
#[derive(Debug, Default)]
struct ScanState {
    open: Vec<String>,
    /// Escaped bytes of a text run that reached the end of the buffer.
    raw: Vec<u8>,
    raw_position: u64,
    text: String,
    tokens: Vec<Token>,
    errors: Vec<String>,
}

impl ScanState {
    fn flush_text(&mut self) {
        if !self.text.is_empty() {
            let text = std::mem::take(&mut self.text);
            self.tokens.push(Token::Text(text));
        }
    }

    fn hold_raw(&mut self, bytes: &[u8], position: u64) {
        if self.raw.is_empty() {
            self.raw_position = position;
        }
        self.raw.extend_from_slice(bytes);
    }

    fn resolve_raw(&mut self) -> bool {
        if self.raw.is_empty() {
            return true;
        }
        let raw = std::mem::take(&mut self.raw);
        match quick_xml::escape::unescape(&decode(&raw)) {
            Ok(text) => {
                self.text.push_str(&text);
                true
            }
            Err(e) => {
                self.error(self.raw_position, e);
                false
            }
        }
    }

    fn error(&mut self, position: u64, message: impl std::fmt::Display) {
        let message = format!("{} at position {}", message, position);
        warn!("markup syntax error: {}", message);
        self.errors.push(message);
    }

    fn start(&mut self, element: &BytesStart<'_>, position: u64) {
        self.flush_text();
        let name = decode(element.name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attribute in element.attributes() {
            match attribute {
                Ok(attribute) => match attribute.unescape_value() {
                    Ok(value) => attributes.push((
                        decode(attribute.key.as_ref()).into_owned(),
                        value.into_owned(),
                    )),
                    Err(e) => self.error(position, e),
                },
                Err(e) => self.error(position, e),
            }
        }
        self.open.push(name.clone());
        self.tokens.push(Token::Start { name, attributes });
    }

    fn end(&mut self, name: &[u8], position: u64) -> bool {
        self.flush_text();
        let name = decode(name);
        match self.open.last() {
            Some(open) if *open == name => {
                self.open.pop();
                self.tokens.push(Token::End(name.into_owned()));
                true
            }
            Some(open) => {
                let message = format!("Mismatched tag: expected '{}', found '{}'", open, name);
                self.error(position, message);
                false
            }
            None => {
                self.error(position, format!("Unexpected end tag '{}'", name));
                false
            }
        }
    }
}

fn decode(bytes: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}

#[derive(Debug, Default)]
pub struct Tokenizer {
    buffer: Vec<u8>,
    /// Bytes dropped from the front of `buffer` so far.
    offset: u64,
    state: ScanState,
}

impl Tokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of elements opened but not yet closed, outermost first.
    pub fn open_elements(&self) -> &[String] {
        &self.state.open
    }

    pub fn take_errors(&mut self) -> Vec<String> {
        std::mem::take(&mut self.state.errors)
    }

    /// Feeds one chunk. Returns `Ok(false)` when a syntax error was found;
    /// `Err` only propagates errors raised by the sink.
    pub fn feed<S: TokenSink>(&mut self, chunk: &[u8], sink: &mut S) -> Result<bool> {
        self.buffer.extend_from_slice(chunk);
        let ok = self.scan(false);
        self.dispatch(sink)?;
        Ok(ok)
    }

    /// Signals end of input: reads whatever is buffered, reports truncated
    /// markup and delivers trailing text.
    pub fn finish<S: TokenSink>(&mut self, sink: &mut S) -> Result<bool> {
        let mut ok = self.scan(true);
        self.state.flush_text();
        if !self.state.open.is_empty() {
            let names = self.state.open.join("', '");
            self.state
                .error(self.offset, format!("Unclosed element(s) '{}'", names));
            ok = false;
        }
        self.dispatch(sink)?;
        Ok(ok)
    }

    fn dispatch<S: TokenSink>(&mut self, sink: &mut S) -> Result<()> {
        for token in self.state.tokens.drain(..) {
            trace!("token {:?}", token);
            match token {
                Token::Start { name, attributes } => sink.start_element(&name, attributes)?,
                Token::Text(text) => sink.characters(&text)?,
                Token::End(name) => sink.end_element(&name)?,
            }
        }
        Ok(())
    }

    fn scan(&mut self, finishing: bool) -> bool {
        let buffer = &self.buffer[..];
        let total = buffer.len();
        let mut reader = Reader::from_reader(buffer);
        let config = reader.config_mut();
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
        config.expand_empty_elements = false;
        config.trim_text(false);

        let state = &mut self.state;
        let base = self.offset;
        let mut ok = true;
        let mut consumed = 0usize;

        loop {
            let before = reader.buffer_position() as usize;
            let event = reader.read_event();
            let after = reader.buffer_position() as usize;
            let position = base + before as u64;
            if !matches!(event, Ok(Event::Text(_))) {
                ok &= state.resolve_raw();
            }
            match event {
                Ok(Event::Start(e)) => state.start(&e, position),
                Ok(Event::Empty(e)) => {
                    state.start(&e, position);
                    ok &= state.end(e.name().as_ref(), position);
                }
                Ok(Event::End(e)) => ok &= state.end(e.name().as_ref(), position),
                Ok(Event::Text(e)) => {
                    state.hold_raw(&e, position);
                    if !finishing && after >= total {
                        consumed = after;
                        break;
                    }
                    ok &= state.resolve_raw();
                }
                Ok(Event::CData(e)) => state.text.push_str(&decode(&e)),
                Ok(Event::Eof) => {
                    consumed = total;
                    break;
                }
                Ok(_) => {}
                // Markup running into the end of the buffer, or a lone `<!`
                // whose kind is decided by the next byte.
                Err(quick_xml::Error::Syntax(_))
                    if !finishing && matches!(buffer.get(after..), None | Some([] | [b'!'])) =>
                {
                    break;
                }
                Err(err) => {
                    state.error(position, err);
                    ok = false;
                    if (finishing && after >= total) || after <= before {
                        consumed = total;
                        break;
                    }
                }
            }
            consumed = after;
        }

        self.buffer.drain(..consumed);
        self.offset += consumed as u64;
        ok
    }
}

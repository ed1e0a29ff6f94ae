/*
 * output.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Output sinks, encoders and pooled buffers.
//!
//! A render writes through a [`RenderOutput`]: literal template text goes to
//! the sink unchanged, values written by output statements pass through the
//! [`TextEncoder`] first. Sinks buffer through a process-wide [`BufferPool`]
//! whose buffers are handed back when their guard drops, including when a
//! render aborts.

use std::io;
use std::sync::Mutex;

use once_cell::sync::Lazy;

use crate::error::RenderResult;
use crate::value::Value;

/// Destination of rendered text.
pub trait TextSink: Send {
    fn write_str(&mut self, text: &str) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl TextSink for String {
    fn write_str(&mut self, text: &str) -> io::Result<()> {
        self.push_str(text);
        Ok(())
    }
}

/// Escapes values written by output statements.
pub trait TextEncoder: Send + Sync {
    fn encode(&self, text: &str, sink: &mut dyn TextSink) -> io::Result<()>;
}

/// Writes values unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEncoder;

impl TextEncoder for NullEncoder {
    fn encode(&self, text: &str, sink: &mut dyn TextSink) -> io::Result<()> {
        sink.write_str(text)
    }
}

/// Escapes `& < > " '` for HTML text and attribute values.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlEncoder;

impl TextEncoder for HtmlEncoder {
    fn encode(&self, text: &str, sink: &mut dyn TextSink) -> io::Result<()> {
        let mut last = 0;
        for (i, b) in text.bytes().enumerate() {
            let replacement = match b {
                b'&' => "&amp;",
                b'<' => "&lt;",
                b'>' => "&gt;",
                b'"' => "&quot;",
                b'\'' => "&#39;",
                _ => continue,
            };
            if last < i {
                sink.write_str(&text[last..i])?;
            }
            sink.write_str(replacement)?;
            last = i + 1;
        }
        if last < text.len() {
            sink.write_str(&text[last..])?;
        }
        Ok(())
    }
}

/// The sink and encoder of one render.
pub struct RenderOutput<'a> {
    sink: &'a mut dyn TextSink,
    encoder: &'a dyn TextEncoder,
}

impl<'a> RenderOutput<'a> {
    pub fn new(sink: &'a mut dyn TextSink, encoder: &'a dyn TextEncoder) -> Self {
        Self { sink, encoder }
    }

    /// Write text without encoding.
    pub fn write_text(&mut self, text: &str) -> RenderResult<()> {
        self.sink.write_str(text)?;
        Ok(())
    }

    /// Write a value's string form, encoded unless `encode` is false.
    pub fn write_value(&mut self, value: &Value, encode: bool) -> RenderResult<()> {
        let owned;
        let text = match value {
            Value::String(s) => &**s,
            other => {
                owned = other.to_string();
                owned.as_str()
            }
        };
        if text.is_empty() {
            return Ok(());
        }
        if encode {
            self.encoder.encode(text, self.sink)?;
        } else {
            self.sink.write_str(text)?;
        }
        Ok(())
    }

    pub fn encoder(&self) -> &'a dyn TextEncoder {
        self.encoder
    }

    pub fn flush(&mut self) -> RenderResult<()> {
        self.sink.flush()?;
        Ok(())
    }
}

// ============================================================================
// Buffer pool
// ============================================================================

/// Buffers larger than this are dropped instead of pooled.
const MAX_POOLED_CAPACITY: usize = 1 << 20;

/// Buffers kept per pool.
const MAX_POOLED_BUFFERS: usize = 64;

static SHARED_POOL: Lazy<BufferPool> = Lazy::new(BufferPool::new);

/// Reusable string buffers.
#[derive(Debug, Default)]
pub struct BufferPool {
    buffers: Mutex<Vec<String>>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide pool.
    pub fn shared() -> &'static BufferPool {
        &SHARED_POOL
    }

    pub fn acquire(&self) -> PooledBuffer<'_> {
        let buffer = self
            .buffers
            .lock()
            .ok()
            .and_then(|mut buffers| buffers.pop())
            .unwrap_or_default();
        PooledBuffer { buffer, pool: self }
    }

    fn release(&self, mut buffer: String) {
        if buffer.capacity() == 0 || buffer.capacity() > MAX_POOLED_CAPACITY {
            return;
        }
        buffer.clear();
        if let Ok(mut buffers) = self.buffers.lock()
            && buffers.len() < MAX_POOLED_BUFFERS
        {
            buffers.push(buffer);
        }
    }

    /// Number of idle buffers.
    pub fn idle(&self) -> usize {
        self.buffers.lock().map(|b| b.len()).unwrap_or(0)
    }
}

/// A buffer on loan from a [`BufferPool`]; returned on drop.
#[derive(Debug)]
pub struct PooledBuffer<'p> {
    buffer: String,
    pool: &'p BufferPool,
}

impl PooledBuffer<'_> {
    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl TextSink for PooledBuffer<'_> {
    fn write_str(&mut self, text: &str) -> io::Result<()> {
        self.buffer.push_str(text);
        Ok(())
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buffer));
    }
}

// ============================================================================
// Writer sink
// ============================================================================

/// Bytes buffered before a [`WriterSink`] writes through.
const FLUSH_THRESHOLD: usize = 8 * 1024;

/// Buffers text from the shared pool and writes it to an `io::Write`.
pub struct WriterSink<W: io::Write + Send> {
    buffer: PooledBuffer<'static>,
    writer: Option<W>,
}

impl<W: io::Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            buffer: BufferPool::shared().acquire(),
            writer: Some(writer),
        }
    }

    fn write_through(&mut self) -> io::Result<()> {
        if let Some(writer) = self.writer.as_mut()
            && !self.buffer.is_empty()
        {
            writer.write_all(self.buffer.as_str().as_bytes())?;
            self.buffer.clear();
        }
        Ok(())
    }

    /// Flush everything and hand the writer back.
    pub fn finish(mut self) -> io::Result<W> {
        self.write_through()?;
        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| io::Error::other("writer already taken"))?;
        writer.flush()?;
        Ok(writer)
    }
}

impl<W: io::Write + Send> TextSink for WriterSink<W> {
    fn write_str(&mut self, text: &str) -> io::Result<()> {
        self.buffer.write_str(text)?;
        if self.buffer.len() >= FLUSH_THRESHOLD {
            self.write_through()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.write_through()?;
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl<W: io::Write + Send> Drop for WriterSink<W> {
    fn drop(&mut self) {
        if self.writer.is_some() {
            let _ = TextSink::flush(self);
        }
    }
}

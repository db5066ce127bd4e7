// Copyright (C) 2021-2026 The laplace Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use std::pin::Pin;

use futures::ready;
use futures::task::Context;
use futures::task::Poll;
use futures::Stream;
use futures::StreamExt as _;

use crate::transport::ByteStream;
use crate::Error;

/// The marker introducing a line carrying event data.
const DATA_PREFIX: &[u8] = b"data:";


/// A stream of event payloads extracted from a Server-Sent-Events
/// response body.
///
/// Only `data:` lines produce items; comments, other fields, and blank
/// keep-alive lines are skipped, as are `data:` lines without content.
/// A read error is reported exactly once, after which the stream is
/// exhausted.
#[must_use = "streams do nothing unless polled"]
pub(crate) struct Frames {
  /// The wrapped body.
  inner: ByteStream,
  /// Bytes received but not yet split into lines.
  buffer: Vec<u8>,
  /// The offset up to which `buffer` is known to contain no newline.
  scanned: usize,
  /// The maximum length of a single line, in bytes.
  max_line_length: usize,
  /// Whether `inner` is exhausted or failed.
  done: bool,
}

impl Frames {
  pub(crate) fn new(inner: ByteStream, max_line_length: usize) -> Self {
    Self {
      inner,
      buffer: Vec::new(),
      scanned: 0,
      max_line_length,
      done: false,
    }
  }

  /// Split off the next complete line from the buffer, if any.
  ///
  /// Once the body ended, whatever remains is treated as the last line.
  fn next_line(&mut self) -> Option<Vec<u8>> {
    let newline = self.buffer[self.scanned..]
      .iter()
      .position(|b| *b == b'\n')
      .map(|idx| idx + self.scanned);

    match newline {
      Some(idx) => {
        let mut line = self.buffer.drain(..=idx).collect::<Vec<_>>();
        self.scanned = 0;
        let _ = line.pop();
        if line.last() == Some(&b'\r') {
          let _ = line.pop();
        }
        Some(line)
      },
      None if self.done && !self.buffer.is_empty() => {
        self.scanned = 0;
        Some(self.buffer.split_off(0))
      },
      None => {
        self.scanned = self.buffer.len();
        None
      },
    }
  }

  /// Fail the stream because a line exceeded the maximum length.
  fn overlong(&mut self) -> Error {
    self.done = true;
    self.buffer.clear();
    self.scanned = 0;
    let error = format!("line exceeds maximum length of {} bytes", self.max_line_length);
    Error::Str(error.into())
  }
}

/// Extract the payload from a line, if it is a non-empty data line.
///
/// The payload is kept as raw bytes. Invalid UTF-8 surfaces when it
/// gets decoded.
fn payload(mut line: Vec<u8>) -> Option<Vec<u8>> {
  if !line.starts_with(DATA_PREFIX) {
    return None
  }
  let mut start = DATA_PREFIX.len();
  if line.get(start) == Some(&b' ') {
    start += 1;
  }
  if start == line.len() {
    None
  } else {
    let _ = line.drain(..start);
    Some(line)
  }
}

impl Stream for Frames {
  type Item = Result<Vec<u8>, Error>;

  fn poll_next(mut self: Pin<&mut Self>, ctx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
    loop {
      if let Some(line) = self.next_line() {
        if line.len() > self.max_line_length {
          break Poll::Ready(Some(Err(self.overlong())))
        }
        match payload(line) {
          Some(payload) => break Poll::Ready(Some(Ok(payload))),
          None => continue,
        }
      }

      if self.done {
        break Poll::Ready(None)
      }

      // All complete lines are gone at this point, so the buffer holds
      // a single line still being assembled.
      if self.buffer.len() > self.max_line_length {
        break Poll::Ready(Some(Err(self.overlong())))
      }

      match ready!(self.inner.poll_next_unpin(ctx)) {
        Some(Ok(bytes)) => self.buffer.extend_from_slice(&bytes),
        Some(Err(err)) => {
          // A partial line is of no use to anybody.
          self.done = true;
          self.buffer.clear();
          self.scanned = 0;
          break Poll::Ready(Some(Err(err)))
        },
        None => self.done = true,
      }
    }
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  use futures::stream::iter;
  use futures::TryStreamExt as _;

  use hyper::body::Bytes;

  use test_log::test;

  use crate::transport::test::lines;


  fn frames(chunks: Vec<&'static str>) -> Frames {
    Frames::new(lines(chunks), 64 * 1024)
  }

  /// Collect all payloads of a stream as strings.
  async fn payloads(stream: Frames) -> Vec<String> {
    stream
      .map_ok(|payload| String::from_utf8(payload).unwrap())
      .try_collect::<Vec<_>>()
      .await
      .unwrap()
  }


  /// Check that only data lines produce payloads.
  #[test(tokio::test)]
  async fn extract_data_lines() {
    let stream = frames(vec![
      ": connected\n",
      "\n",
      "event: price\n",
      "data: {\"s\":\"AKBNK\"}\n",
      "id: 17\n",
      "data:{\"s\":\"ASELS\"}\n",
      "\n",
    ]);

    let payloads = payloads(stream).await;
    assert_eq!(payloads, vec![r#"{"s":"AKBNK"}"#, r#"{"s":"ASELS"}"#]);
  }

  /// Check that lines split across chunks get reassembled and that
  /// carriage returns are removed.
  #[test(tokio::test)]
  async fn reassemble_split_lines() {
    let stream = frames(vec!["da", "ta: {\"s\":", "\"TUPRS\"}\r", "\ndata: 1\r\nda", "ta: 2"]);

    let payloads = payloads(stream).await;
    assert_eq!(payloads, vec![r#"{"s":"TUPRS"}"#, "1", "2"]);
  }

  /// Check that data lines without content are not reported.
  #[test(tokio::test)]
  async fn skip_empty_payloads() {
    let stream = frames(vec!["data:\n", "data: \n", "data:  \n", "data: x\n"]);

    let payloads = payloads(stream).await;
    // Only a single space after the colon is part of the framing.
    assert_eq!(payloads, vec![" ", "x"]);
  }

  /// Check that payloads are passed on byte for byte, even if they are
  /// not valid UTF-8.
  #[test(tokio::test)]
  async fn pass_through_raw_bytes() {
    let chunks: Vec<Result<_, Error>> = vec![Ok(Bytes::from_static(b"data: {\"s\":\"AK\xffBNK\"}\n"))];
    let mut stream = Frames::new(iter(chunks).boxed(), 1024);

    let payload = stream.next().await.unwrap().unwrap();
    assert_eq!(payload, b"{\"s\":\"AK\xffBNK\"}".to_vec());
    assert!(stream.next().await.is_none());
  }

  /// Check that a read error is reported once, after all complete
  /// lines, and that the stream ends afterwards.
  #[test(tokio::test)]
  async fn read_error_ends_stream() {
    let chunks = vec![
      Ok(Bytes::from_static(b"data: 1\ndata: 2\ndata: part")),
      Err(Error::Str("connection reset".into())),
      Ok(Bytes::from_static(b"data: 3\n")),
    ];
    let mut stream = Frames::new(iter(chunks).boxed(), 1024);

    assert_eq!(stream.next().await.unwrap().unwrap(), b"1");
    assert_eq!(stream.next().await.unwrap().unwrap(), b"2");
    let err = stream.next().await.unwrap().unwrap_err();
    assert_eq!(err.to_string(), "connection reset");
    assert!(stream.next().await.is_none());
    assert!(stream.next().await.is_none());
  }

  /// Check that an overly long line still being assembled is rejected,
  /// after complete lines received earlier.
  #[test(tokio::test)]
  async fn reject_overlong_pending_line() {
    let mut stream = Frames::new(lines(["data: 1\n", "data: 0123456789"]), 8);

    assert_eq!(stream.next().await.unwrap().unwrap(), b"1");
    let err = stream.next().await.unwrap().unwrap_err();
    assert!(err.to_string().starts_with("line exceeds maximum length"), "{err}");
    assert!(stream.next().await.is_none());
  }

  /// Check that an overly long line is rejected even when it arrives
  /// complete within a single chunk.
  #[test(tokio::test)]
  async fn reject_overlong_complete_line() {
    let mut stream = Frames::new(lines(["data: 0123456789abcdef\ndata: 2\n"]), 8);

    let err = stream.next().await.unwrap().unwrap_err();
    assert_eq!(err.to_string(), "line exceeds maximum length of 8 bytes");
    assert!(stream.next().await.is_none());
  }

  /// Check that complete lines sharing a chunk with an overly long one
  /// are delivered before the failure is reported.
  #[test(tokio::test)]
  async fn deliver_lines_before_overlong_tail() {
    let mut stream = Frames::new(lines(["data: 1\ndata: 2\ndata: 0123456789"]), 8);

    assert_eq!(stream.next().await.unwrap().unwrap(), b"1");
    assert_eq!(stream.next().await.unwrap().unwrap(), b"2");
    let err = stream.next().await.unwrap().unwrap_err();
    assert!(err.to_string().starts_with("line exceeds maximum length"), "{err}");
    assert!(stream.next().await.is_none());
  }
}

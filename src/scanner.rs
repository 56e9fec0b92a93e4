//! Log scanner
//!
//! Splits a byte stream into numbered lines without buffering more than the
//! line currently being assembled. `\n`, `\r\n` and a lone `\r` all end a
//! line; a trailing partial line still counts.

use futures::stream::{self, Stream};
use std::io::{self, BufRead};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// A single log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// 1-based line number
    pub line_number: usize,
    /// Line text without its terminator
    pub text: String,
}

/// Line assembly shared by the sync and async scanners
#[derive(Debug, Default)]
struct LineSplitter {
    pending: Vec<u8>,
    /// Previous line ended in `\r`; a leading `\n` belongs to it
    skip_lf: bool,
    /// `pending` holds bytes of an unterminated line
    partial: bool,
    lines_emitted: usize,
}

impl LineSplitter {
    /// Consume bytes from `buf` up to and including the next terminator.
    /// Returns the number of bytes used and whether a line is complete.
    fn feed(&mut self, buf: &[u8]) -> (usize, bool) {
        let mut start = 0;
        if self.skip_lf {
            self.skip_lf = false;
            if buf.first() == Some(&b'\n') {
                start = 1;
            }
        }

        let rest = &buf[start..];
        match rest.iter().position(|&b| b == b'\n' || b == b'\r') {
            Some(i) => {
                self.pending.extend_from_slice(&rest[..i]);
                self.skip_lf = rest[i] == b'\r';
                (start + i + 1, true)
            }
            None => {
                self.pending.extend_from_slice(rest);
                self.partial |= !rest.is_empty();
                (buf.len(), false)
            }
        }
    }

    fn take_line(&mut self) -> LogLine {
        self.partial = false;
        self.lines_emitted += 1;

        let bytes = std::mem::take(&mut self.pending);
        let text = String::from_utf8(bytes)
            .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned());

        LogLine {
            line_number: self.lines_emitted,
            text,
        }
    }

    /// Flush the unterminated last line at end of input
    fn finish(&mut self) -> Option<LogLine> {
        if self.partial {
            Some(self.take_line())
        } else {
            None
        }
    }
}

/// Blocking scanner over any `BufRead`
pub struct LogScanner<R> {
    reader: R,
    splitter: LineSplitter,
    done: bool,
}

impl<R: BufRead> LogScanner<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            splitter: LineSplitter::default(),
            done: false,
        }
    }

    /// Number of lines produced so far
    pub fn lines_read(&self) -> usize {
        self.splitter.lines_emitted
    }

    fn next_line(&mut self) -> io::Result<Option<LogLine>> {
        loop {
            let (used, complete) = {
                let buf = match self.reader.fill_buf() {
                    Ok(buf) => buf,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                };
                if buf.is_empty() {
                    return Ok(self.splitter.finish());
                }
                self.splitter.feed(buf)
            };

            self.reader.consume(used);
            if complete {
                return Ok(Some(self.splitter.take_line()));
            }
        }
    }
}

impl<R: BufRead> Iterator for LogScanner<R> {
    type Item = io::Result<LogLine>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.next_line() {
            Ok(Some(line)) => Some(Ok(line)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Non-blocking scanner over a tokio `AsyncBufRead`
pub struct AsyncLogScanner<R> {
    reader: R,
    splitter: LineSplitter,
    done: bool,
}

impl<R: AsyncBufRead + Unpin> AsyncLogScanner<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            splitter: LineSplitter::default(),
            done: false,
        }
    }

    pub fn lines_read(&self) -> usize {
        self.splitter.lines_emitted
    }

    /// Read the next line, `None` once the stream is exhausted
    pub async fn next_line(&mut self) -> io::Result<Option<LogLine>> {
        if self.done {
            return Ok(None);
        }

        loop {
            let (used, complete) = {
                let buf = match self.reader.fill_buf().await {
                    Ok(buf) => buf,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        self.done = true;
                        return Err(e);
                    }
                };
                if buf.is_empty() {
                    self.done = true;
                    return Ok(self.splitter.finish());
                }
                self.splitter.feed(buf)
            };

            self.reader.consume(used);
            if complete {
                return Ok(Some(self.splitter.take_line()));
            }
        }
    }

    /// Turn the scanner into a `Stream` of lines
    pub fn into_stream(self) -> impl Stream<Item = io::Result<LogLine>> {
        stream::try_unfold(self, |mut scanner| async move {
            let line = scanner.next_line().await?;
            Ok::<_, io::Error>(line.map(|line| (line, scanner)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::io::{BufReader, Cursor, Read};

    fn scan(input: &[u8]) -> Vec<(usize, String)> {
        LogScanner::new(Cursor::new(input.to_vec()))
            .map(|line| {
                let line = line.unwrap();
                (line.line_number, line.text)
            })
            .collect()
    }

    fn texts(input: &[u8]) -> Vec<String> {
        scan(input).into_iter().map(|(_, text)| text).collect()
    }

    #[test]
    fn test_empty_input() {
        assert!(scan(b"").is_empty());
    }

    #[test]
    fn test_line_numbers_start_at_one() {
        let lines = scan(b"first\nsecond\nthird\n");
        assert_eq!(
            lines,
            vec![
                (1, "first".to_string()),
                (2, "second".to_string()),
                (3, "third".to_string()),
            ]
        );
    }

    #[test]
    fn test_missing_trailing_newline() {
        assert_eq!(texts(b"a\nb"), vec!["a", "b"]);
        assert_eq!(texts(b"only line"), vec!["only line"]);
    }

    #[test]
    fn test_mixed_line_endings() {
        assert_eq!(texts(b"a\r\nb\rc\nd"), vec!["a", "b", "c", "d"]);
        assert_eq!(texts(b"a\r"), vec!["a"]);
        assert_eq!(texts(b"a\r\r\nb"), vec!["a", "", "b"]);
    }

    #[test]
    fn test_blank_lines_are_counted() {
        let lines = scan(b"\n\nerror\n");
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2], (3, "error".to_string()));
    }

    #[test]
    fn test_crlf_split_across_buffers() {
        // A one-byte buffer forces every terminator across a refill boundary.
        let reader = BufReader::with_capacity(1, Cursor::new(b"one\r\ntwo\r\nthree".to_vec()));
        let lines: Vec<String> = LogScanner::new(reader).map(|l| l.unwrap().text).collect();
        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let lines = texts(b"bad \xff byte\nok\n");
        assert_eq!(lines[0], "bad \u{fffd} byte");
        assert_eq!(lines[1], "ok");
    }

    struct FailingReader {
        served: bool,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.served {
                return Err(io::Error::new(io::ErrorKind::Other, "disk gone"));
            }
            self.served = true;
            let data = b"line one\nline t";
            buf[..data.len()].copy_from_slice(data);
            Ok(data.len())
        }
    }

    #[test]
    fn test_read_error_mid_stream() {
        let mut scanner = LogScanner::new(BufReader::new(FailingReader { served: false }));

        assert_eq!(scanner.next().unwrap().unwrap().text, "line one");
        assert!(scanner.next().unwrap().is_err());
        assert!(scanner.next().is_none());
    }

    #[test]
    fn test_async_scanner_matches_sync() {
        let input = b"a\r\nb\rc\n\nd".to_vec();
        let expected = scan(&input);

        let reader = tokio_test::io::Builder::new()
            .read(b"a\r")
            .read(b"\nb\r")
            .read(b"c\n\nd")
            .build();
        let reader = tokio::io::BufReader::new(reader);

        let lines: Vec<LogLine> =
            tokio_test::block_on(AsyncLogScanner::new(reader).into_stream().try_collect()).unwrap();
        let lines: Vec<(usize, String)> =
            lines.into_iter().map(|l| (l.line_number, l.text)).collect();

        assert_eq!(lines, expected);
    }

    #[test]
    fn test_async_read_error() {
        let reader = tokio_test::io::Builder::new()
            .read(b"ok\n")
            .read_error(io::Error::new(io::ErrorKind::BrokenPipe, "client went away"))
            .build();
        let mut scanner = AsyncLogScanner::new(tokio::io::BufReader::new(reader));

        tokio_test::block_on(async {
            assert_eq!(scanner.next_line().await.unwrap().unwrap().text, "ok");
            assert!(scanner.next_line().await.is_err());
            assert!(scanner.next_line().await.unwrap().is_none());
        });
    }
}

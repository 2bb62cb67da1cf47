use std::io::{self, Seek, SeekFrom, Write};

use lantern::http::response::{Response, StatusCode};
use lantern::http::writer::{FILE_CHUNK, ResponseWriter, WriteError, WriteProgress};

/// Accepts at most `per_call` bytes per write and reports would-block once
/// `room` is used up.
struct Choked {
    out: Vec<u8>,
    per_call: usize,
    room: usize,
}

impl Choked {
    fn new(per_call: usize, room: usize) -> Self {
        Self {
            out: Vec::new(),
            per_call,
            room,
        }
    }
}

impl Write for Choked {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.room == 0 {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = buf.len().min(self.per_call).min(self.room);
        self.out.extend_from_slice(&buf[..n]);
        self.room -= n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct Broken;

impl Write for Broken {
    fn write(&mut self, _: &[u8]) -> io::Result<usize> {
        Err(io::ErrorKind::BrokenPipe.into())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn split_head(wire: &[u8]) -> (String, &[u8]) {
    let end = wire
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("no end of head");
    (
        String::from_utf8(wire[..end + 4].to_vec()).unwrap(),
        &wire[end + 4..],
    )
}

fn write_all(writer: &mut ResponseWriter) -> Vec<u8> {
    let mut out = Vec::new();
    assert_eq!(writer.write_to(&mut out).unwrap(), WriteProgress::Done);
    out
}

fn hello_response() -> Response {
    let mut res = Response::new();
    res.set_body_static(b"hello world");
    res.header("content-type", "text/raw");
    res
}

#[test]
fn test_write_static_body() {
    let mut writer = ResponseWriter::new(hello_response()).unwrap();
    let wire = write_all(&mut writer);

    assert!(wire.starts_with(b"HTTP/1.1 200 OK\r\n"));
    assert!(wire.ends_with(b"hello world"));

    let (head, body) = split_head(&wire);
    assert!(head.contains("content-length: 11\r\n"));
    assert!(head.contains("content-type: text/raw\r\n"));
    assert!(head.contains("connection: keep-alive\r\n"));
    assert!(head.contains(concat!("server: lantern/", env!("CARGO_PKG_VERSION"), "\r\n")));
    assert_eq!(body, b"hello world");
    assert_eq!(writer.total_len(), wire.len() as u64);
}

#[test]
fn test_head_order() {
    let mut writer = ResponseWriter::new(hello_response()).unwrap();
    let wire = write_all(&mut writer);
    let (head, _) = split_head(&wire);

    let lines: Vec<&str> = head.split("\r\n").collect();
    assert_eq!(lines[0], "HTTP/1.1 200 OK");
    assert!(lines[1].starts_with("date: "));
    assert!(lines[2].starts_with("server: "));
    assert_eq!(lines[3], "connection: keep-alive");
    assert_eq!(lines[4], "content-length: 11");
    assert_eq!(lines[5], "content-type: text/raw");
    assert_eq!(&lines[6..], ["", ""]);
}

#[test]
fn test_head_bytes_are_exact() {
    let mut res = Response::new();
    res.status = StatusCode::from(404);
    res.header("x-name", b"caf\xe9".to_vec());
    let mut writer = ResponseWriter::new(res).unwrap();
    let wire = write_all(&mut writer);

    let date_start = wire.windows(6).position(|w| w == b"date: ").unwrap() + 6;
    let date_len = wire[date_start..]
        .windows(2)
        .position(|w| w == b"\r\n")
        .unwrap();
    let date = &wire[date_start..date_start + date_len];
    assert_eq!(date_len, 29);

    let mut expected = b"HTTP/1.1 404 Not Found\r\ndate: ".to_vec();
    expected.extend_from_slice(date);
    expected.extend_from_slice(
        concat!("\r\nserver: lantern/", env!("CARGO_PKG_VERSION"), "\r\n").as_bytes(),
    );
    expected.extend_from_slice(b"connection: keep-alive\r\ncontent-length: 0\r\n");
    expected.extend_from_slice(b"x-name: caf\xe9\r\n\r\n");
    assert_eq!(wire, expected);
    assert_eq!(writer.total_len(), expected.len() as u64);
}

#[test]
fn test_date_header_is_http_date() {
    let mut writer = ResponseWriter::new(Response::new()).unwrap();
    let wire = write_all(&mut writer);
    let (head, _) = split_head(&wire);

    let date = head
        .lines()
        .find_map(|l| l.strip_prefix("date: "))
        .unwrap();
    assert!(date.ends_with(" GMT"));
    httpdate::parse_http_date(date).unwrap();
}

#[test]
fn test_user_headers_newest_first() {
    let mut res = Response::new();
    res.header("x-a", "1").header("x-b", "2");
    let mut writer = ResponseWriter::new(res).unwrap();
    let wire = write_all(&mut writer);
    let (head, _) = split_head(&wire);

    let a = head.find("x-a: 1").unwrap();
    let b = head.find("x-b: 2").unwrap();
    assert!(b < a);
}

#[test]
fn test_empty_body() {
    let mut writer = ResponseWriter::new(Response::with_status(StatusCode::NO_CONTENT)).unwrap();
    let wire = write_all(&mut writer);
    let (head, body) = split_head(&wire);

    assert!(head.starts_with("HTTP/1.1 204 No Content\r\n"));
    assert!(head.contains("content-length: 0\r\n"));
    assert!(body.is_empty());
}

#[test]
fn test_owned_body() {
    let mut res = Response::new();
    res.set_body(format!("{{\"n\":{}}}", 7));
    let mut writer = ResponseWriter::new(res).unwrap();
    let wire = write_all(&mut writer);
    let (head, body) = split_head(&wire);

    assert!(head.contains("content-length: 7\r\n"));
    assert_eq!(body, b"{\"n\":7}");
}

#[test]
fn test_closing_response() {
    let writer = ResponseWriter::closing(Response::with_status(StatusCode::BAD_REQUEST)).unwrap();
    assert!(!writer.keep_alive());

    let mut writer = writer;
    let wire = write_all(&mut writer);
    let (head, _) = split_head(&wire);
    assert!(head.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert!(head.contains("connection: close\r\n"));
    assert!(!head.contains("keep-alive"));
}

#[test]
fn test_unknown_status_is_refused() {
    for code in [0, 299, 418, 999] {
        let err = ResponseWriter::new(Response::with_status(StatusCode::new(code))).unwrap_err();
        assert!(matches!(err, WriteError::UnknownStatus(c) if c == code));
    }
}

#[test]
fn test_partial_writes_resume_where_they_stopped() {
    let mut res = Response::new();
    res.set_body(vec![b'z'; 10_000]);
    let mut writer = ResponseWriter::new(res).unwrap();
    let total = writer.total_len() as usize;

    let mut sink = Choked::new(7, 50);
    let mut rounds = 0;
    loop {
        match writer.write_to(&mut sink).unwrap() {
            WriteProgress::Done => break,
            WriteProgress::Blocked => {
                rounds += 1;
                sink.room = 333;
            }
        }
    }

    assert!(rounds > 10);
    assert_eq!(sink.out.len(), total);
    let (head, body) = split_head(&sink.out);
    assert!(head.contains("content-length: 10000\r\n"));
    assert!(body.iter().all(|&b| b == b'z'));
    assert_eq!(body.len(), 10_000);
}

#[test]
fn test_blocked_before_any_byte() {
    let mut writer = ResponseWriter::new(hello_response()).unwrap();
    let mut sink = Choked::new(usize::MAX, 0);

    assert_eq!(writer.write_to(&mut sink).unwrap(), WriteProgress::Blocked);
    assert!(sink.out.is_empty());

    sink.room = usize::MAX;
    assert_eq!(writer.write_to(&mut sink).unwrap(), WriteProgress::Done);
    assert!(sink.out.ends_with(b"hello world"));
}

#[test]
fn test_send_failure_is_io_error() {
    let mut writer = ResponseWriter::new(hello_response()).unwrap();
    let err = writer.write_to(&mut Broken).unwrap_err();
    assert!(matches!(err, WriteError::Io(ref e) if e.kind() == io::ErrorKind::BrokenPipe));
}

fn file_with(content: &[u8]) -> std::fs::File {
    let mut file = tempfile::tempfile().unwrap();
    file.write_all(content).unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();
    file
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[test]
fn test_file_body_spanning_chunks() {
    let content = pattern(FILE_CHUNK * 3 + 17);
    let mut res = Response::new();
    res.set_body_file(file_with(&content), content.len() as u64);

    let mut writer = ResponseWriter::new(res).unwrap();
    let wire = write_all(&mut writer);
    let (head, body) = split_head(&wire);

    assert!(head.contains(&format!("content-length: {}\r\n", content.len())));
    assert_eq!(body, &content[..]);
}

#[test]
fn test_file_body_sends_only_declared_length() {
    let content = pattern(1000);
    let mut res = Response::new();
    res.set_body_file(file_with(&content), 600);

    let mut writer = ResponseWriter::new(res).unwrap();
    let wire = write_all(&mut writer);
    let (head, body) = split_head(&wire);

    assert!(head.contains("content-length: 600\r\n"));
    assert_eq!(body, &content[..600]);
}

#[test]
fn test_file_body_with_slow_socket() {
    let content = pattern(FILE_CHUNK + 4096);
    let mut res = Response::new();
    res.set_body_file(file_with(&content), content.len() as u64);
    let mut writer = ResponseWriter::new(res).unwrap();

    let mut sink = Choked::new(1000, 3000);
    while writer.write_to(&mut sink).unwrap() == WriteProgress::Blocked {
        sink.room = 3000;
    }

    let (_, body) = split_head(&sink.out);
    assert_eq!(body, &content[..]);
}

#[test]
fn test_short_file_is_an_error() {
    let mut res = Response::new();
    res.set_body_file(file_with(b"only ten b"), 20);
    let mut writer = ResponseWriter::new(res).unwrap();

    let mut out = Vec::new();
    let err = writer.write_to(&mut out).unwrap_err();
    assert!(matches!(err, WriteError::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
}

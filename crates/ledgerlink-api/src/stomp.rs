//! Minimal STOMP 1.2 frame codec.
//!
//! Only what the notification link needs: CONNECT / SUBSCRIBE / DISCONNECT
//! going out, CONNECTED / MESSAGE / ERROR / RECEIPT coming in. Frames are
//! carried one (or more) per WebSocket text message and terminated by NUL.

use crate::error::Error;

const NUL: char = '\0';

/// A single STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of the named header. Repeated headers keep the first
    /// occurrence, as STOMP 1.2 requires.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// The CONNECT frame for a bearer-authenticated session.
    pub fn connect(host: &str, bearer: &str) -> Self {
        Self::new("CONNECT")
            .header("accept-version", "1.2")
            .header("host", host)
            .header("heart-beat", "0,0")
            .header("Authorization", format!("Bearer {bearer}"))
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new("SUBSCRIBE")
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Self::new("UNSUBSCRIBE").header("id", id)
    }

    pub fn disconnect() -> Self {
        Self::new("DISCONNECT")
    }

    /// Serialize to wire format, NUL-terminated.
    pub fn encode(&self) -> String {
        // CONNECT/CONNECTED headers are never escaped (STOMP 1.2 §Value Encoding).
        let escape_headers = self.command != "CONNECT" && self.command != "CONNECTED";

        let mut out = String::with_capacity(self.body.len() + 64);
        out.push_str(&self.command);
        out.push('\n');
        for (name, value) in &self.headers {
            if escape_headers {
                out.push_str(&escape(name));
                out.push(':');
                out.push_str(&escape(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push(NUL);
        out
    }

    /// Split a WebSocket text payload into frames.
    ///
    /// Heart-beat EOLs between frames are skipped, so a payload consisting
    /// only of newlines yields an empty vec.
    pub fn decode_all(text: &str) -> Result<Vec<Self>, Error> {
        Self::decode_each(text).collect()
    }

    /// Like [`decode_all`](Self::decode_all), but yields each frame's result
    /// separately so one bad frame does not take its neighbours with it.
    pub fn decode_each(text: &str) -> impl Iterator<Item = Result<Self, Error>> + '_ {
        text.split(NUL)
            .map(|chunk| chunk.trim_start_matches(['\r', '\n']))
            .filter(|chunk| !chunk.is_empty())
            .map(Self::decode_one)
    }

    fn decode_one(raw: &str) -> Result<Self, Error> {
        let (head, body) = match raw.find("\n\n") {
            Some(idx) => (&raw[..idx], &raw[idx + 2..]),
            None => match raw.find("\r\n\r\n") {
                Some(idx) => (&raw[..idx], &raw[idx + 4..]),
                None => (raw, ""),
            },
        };

        let mut lines = head.lines();
        let command = lines
            .next()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::Stomp {
                message: "frame without a command".into(),
            })?
            .to_owned();
        let unescape_headers = command != "CONNECTED";

        let mut headers = Vec::new();
        for line in lines {
            let line = line.trim_end_matches('\r');
            let (name, value) = line.split_once(':').ok_or_else(|| Error::Stomp {
                message: format!("malformed header line: {line:?}"),
            })?;
            if unescape_headers {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_owned(), value.to_owned()));
            }
        }

        Ok(Self {
            command,
            headers,
            body: body.to_owned(),
        })
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(raw: &str) -> Result<String, Error> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(Error::Stomp {
                    message: format!("invalid header escape: \\{}", other.unwrap_or(' ')),
                });
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn connect_frame_carries_bearer_unescaped() {
        let wire = Frame::connect("bank.example", "a.b:c").encode();
        assert!(wire.starts_with("CONNECT\n"));
        assert!(wire.contains("Authorization:Bearer a.b:c\n"));
        assert!(wire.ends_with("\n\n\0"));
    }

    #[test]
    fn subscribe_frame_escapes_colons() {
        let wire = Frame::subscribe("sub-0", "/topic/notifications/a:b").encode();
        assert!(wire.contains("destination:/topic/notifications/a\\cb\n"));
    }

    #[test]
    fn decodes_message_frame() {
        let text = "MESSAGE\ndestination:/topic/notifications/jo@bank.io\nsubscription:sub-0\n\
                    message-id:7\n\n{\"type\":\"LOAN\",\"message\":\"Approved\"}\0";
        let frames = Frame::decode_all(text).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].command, "MESSAGE");
        assert_eq!(frames[0].get_header("subscription"), Some("sub-0"));
        assert_eq!(frames[0].body, "{\"type\":\"LOAN\",\"message\":\"Approved\"}");
    }

    #[test]
    fn heartbeat_only_payload_yields_no_frames() {
        assert!(Frame::decode_all("\n").unwrap().is_empty());
        assert!(Frame::decode_all("\r\n\n").unwrap().is_empty());
    }

    #[test]
    fn decodes_multiple_frames_in_one_payload() {
        let text = "CONNECTED\nversion:1.2\n\n\0\nMESSAGE\nmessage-id:1\n\nhi\0";
        let frames = Frame::decode_all(text).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].command, "CONNECTED");
        assert_eq!(frames[0].get_header("version"), Some("1.2"));
        assert_eq!(frames[1].body, "hi");
    }

    #[test]
    fn unescapes_header_values() {
        let frames = Frame::decode_all("MESSAGE\nx:a\\cb\\nc\\\\\n\n\0").unwrap();
        assert_eq!(frames[0].get_header("x"), Some("a:b\nc\\"));
    }

    #[test]
    fn decode_each_isolates_a_bad_frame() {
        let text = "MESSAGE\nbroken\n\nlost\0MESSAGE\nmessage-id:2\n\nkept\0";
        let results: Vec<_> = Frame::decode_each(text).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_err());
        assert_eq!(results[1].as_ref().unwrap().body, "kept");
    }

    #[test]
    fn rejects_header_without_colon() {
        let err = Frame::decode_all("MESSAGE\nbroken\n\nbody\0").unwrap_err();
        assert!(matches!(err, Error::Stomp { .. }));
    }
}

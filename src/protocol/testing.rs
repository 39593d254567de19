//! In-process stand-in for the inventory server, driven by a script of
//! replies. Each scripted reply answers one request frame.
use std::{
    io::{Read, Write},
    net::TcpListener,
    sync::mpsc::{self, Receiver},
    thread,
    time::Duration,
};

use super::framing;

pub enum Reply {
    /// Answer with a complete frame.
    Frame(String),
    /// Read the request and never answer.
    Stall,
    /// Announce `length` bytes but only send `body`.
    Partial { length: u32, body: String },
}

pub struct FakeServer {
    port: u16,
    requests: Receiver<String>,
    closed: Receiver<()>,
}

fn read_frame(stream: &mut impl Read) -> Option<String> {
    let mut prefix = [0u8; framing::PREFIX_LEN];
    stream.read_exact(&mut prefix).ok()?;
    let length = framing::decode_length(prefix).ok()?;
    let mut body = vec![0u8; length as usize];
    stream.read_exact(&mut body).ok()?;
    Some(String::from_utf8_lossy(&body).into_owned())
}

impl FakeServer {
    pub fn start(script: Vec<Reply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake server");
        let port = listener.local_addr().expect("local addr").port();
        let (request_tx, requests) = mpsc::channel();
        let (closed_tx, closed) = mpsc::channel();

        thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            stream
                .set_read_timeout(Some(Duration::from_secs(10)))
                .expect("server read timeout");

            let mut script = script.into_iter();
            loop {
                let Some(request) = read_frame(&mut stream) else {
                    let _ = closed_tx.send(());
                    return;
                };
                let _ = request_tx.send(request);

                match script.next() {
                    Some(Reply::Frame(body)) => {
                        let framed = framing::encode(body.as_bytes()).expect("frame reply");
                        if stream.write_all(&framed).is_err() {
                            return;
                        }
                    }
                    Some(Reply::Partial { length, body }) => {
                        let _ = stream.write_all(&length.to_be_bytes());
                        let _ = stream.write_all(body.as_bytes());
                    }
                    Some(Reply::Stall) | None => {}
                }
            }
        });

        Self {
            port,
            requests,
            closed,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Request bodies in the order they arrived.
    pub fn requests(&self) -> &Receiver<String> {
        &self.requests
    }

    /// Whether the client closed its end within a few seconds.
    pub fn wait_closed(&self) -> bool {
        self.closed.recv_timeout(Duration::from_secs(5)).is_ok()
    }
}

pub fn login_ok(key: &str) -> String {
    format!(
        "<FbiXml><Ticket><Key>{key}</Key></Ticket>\
         <FbiMsgsRs statusCode=\"1000\"><LoginRs statusCode=\"1000\"/></FbiMsgsRs></FbiXml>"
    )
}

/// Standard envelope around one operation response element.
pub fn response(node: &str, status: &str, inner: &str) -> String {
    format!(
        "<FbiXml><Ticket/><FbiMsgsRs statusCode=\"1000\">\
         <{node} statusCode=\"{status}\">{inner}</{node}></FbiMsgsRs></FbiXml>"
    )
}

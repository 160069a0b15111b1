//! Minimal HTTP/1.1 server answering a fixed sequence of requests, used to exercise the
//! client without reaching the real API.

use std::{
    io::{BufRead, BufReader, Write},
    net::TcpListener,
    thread::JoinHandle,
};

pub(crate) struct Canned {
    pub base_url: String,
    handle: JoinHandle<Vec<String>>,
}

impl Canned {
    /// Serve each `(status line, body)` pair to one connection, in order.
    pub fn serve(responses: Vec<(&'static str, &'static str)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("could not bind test server");
        let addr = listener.local_addr().expect("test server has no address");

        let handle = std::thread::spawn(move || {
            let mut requests = Vec::new();

            for (status, body) in responses {
                let (mut stream, _) = listener.accept().expect("accept failed");
                let mut reader = BufReader::new(stream.try_clone().expect("clone failed"));

                let mut request_line = String::new();
                reader.read_line(&mut request_line).expect("no request line");
                requests.push(request_line.trim_end().to_owned());

                loop {
                    let mut header = String::new();
                    let read = reader.read_line(&mut header).expect("bad header");
                    if read == 0 || header == "\r\n" {
                        break;
                    }
                }

                write!(
                    stream,
                    "HTTP/1.1 {status}\r\n\
                     Content-Type: application/json\r\n\
                     Content-Length: {}\r\n\
                     Connection: close\r\n\r\n\
                     {body}",
                    body.len()
                )
                .expect("could not answer");
            }

            requests
        });

        Self {
            base_url: format!("http://{addr}/json/"),
            handle,
        }
    }

    pub fn one(status: &'static str, body: &'static str) -> Self {
        Self::serve(vec![(status, body)])
    }

    /// Request lines received, e.g. `GET /json/list.php?... HTTP/1.1`.
    pub fn requests(self) -> Vec<String> {
        self.handle.join().expect("test server panicked")
    }
}

/// Base URL of a port nothing listens on.
pub(crate) fn refused_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("could not bind");
    let addr = listener.local_addr().expect("no address");
    drop(listener);

    format!("http://{addr}/json/")
}

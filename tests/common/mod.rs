pub mod test_server {
    use mockserve::MockServer;
    use std::net::SocketAddr;
    use std::ops::Deref;
    use std::sync::Once;

    /// Ensures May coroutines are configured only once
    static MAY_INIT: Once = Once::new();

    pub fn setup_may_runtime() {
        MAY_INIT.call_once(|| {
            may::config().set_stack_size(0x8000);
            mockserve::logging::init_test_logging();
        });
    }

    /// A listening mock server that closes itself when the test ends,
    /// including when the test panics.
    pub struct RunningMock {
        server: MockServer,
        pub addr: SocketAddr,
    }

    impl RunningMock {
        pub fn start(server: MockServer) -> Self {
            setup_may_runtime();
            server.listen("127.0.0.1:0").unwrap();
            let addr = server.local_addr().unwrap();
            Self { server, addr }
        }
    }

    impl Deref for RunningMock {
        type Target = MockServer;

        fn deref(&self) -> &MockServer {
            &self.server
        }
    }

    impl Drop for RunningMock {
        fn drop(&mut self) {
            self.server.close();
        }
    }
}

pub mod http {
    use std::collections::HashMap;
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpStream};
    use std::thread;
    use std::time::Duration;

    /// Parsed raw HTTP response
    #[derive(Debug)]
    pub struct RawResponse {
        pub status: u16,
        pub headers: HashMap<String, String>,
        pub body: String,
    }

    impl RawResponse {
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .get(&name.to_ascii_lowercase())
                .map(String::as_str)
        }

        pub fn json(&self) -> serde_json::Value {
            serde_json::from_str(&self.body).unwrap()
        }
    }

    pub fn send_request(addr: &SocketAddr, req: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(req.as_bytes()).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_millis(200)))
            .unwrap();
        let mut buf = Vec::new();
        loop {
            let mut tmp = [0u8; 1024];
            match stream.read(&mut tmp) {
                Ok(0) => break,
                Ok(n) => buf.extend_from_slice(&tmp[..n]),
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    break
                }
                Err(e) => panic!("read error: {:?}", e),
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    pub fn parse_response(resp: &str) -> RawResponse {
        let (head, body) = resp.split_once("\r\n\r\n").unwrap_or((resp, ""));
        let mut status = 0;
        let mut headers = HashMap::new();
        for line in head.lines() {
            if line.starts_with("HTTP/1.") {
                status = line
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or("0")
                    .parse()
                    .unwrap();
            } else if let Some((name, val)) = line.split_once(':') {
                headers.insert(name.trim().to_ascii_lowercase(), val.trim().to_string());
            }
        }
        RawResponse {
            status,
            headers,
            body: body.to_string(),
        }
    }

    pub fn get(addr: &SocketAddr, path: &str) -> RawResponse {
        let req = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        parse_response(&send_request(addr, &req))
    }

    pub fn post(addr: &SocketAddr, path: &str, content_type: &str, body: &str) -> RawResponse {
        let req = format!(
            "POST {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        parse_response(&send_request(addr, &req))
    }

    /// Poll until nothing accepts connections on `addr`
    pub fn wait_refused(addr: &SocketAddr) -> bool {
        for _ in 0..50 {
            if TcpStream::connect(addr).is_err() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }
}

//! Local HTTP server that receives the OAuth redirect.

use crate::{AuthError, AuthResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, info};

type CallbackResult = Result<String, String>;
type ResultSlot = Arc<Mutex<Option<oneshot::Sender<CallbackResult>>>>;

/// Callback server bound to `127.0.0.1:{port}`.
///
/// Bind first, open the browser, then [`wait_for_code`](Self::wait_for_code).
/// Binding before the browser opens guarantees the redirect has a listener.
pub struct OAuthCallbackServer {
    listener: TcpListener,
    port: u16,
    timeout: Duration,
}

impl OAuthCallbackServer {
    /// Bind the callback listener. Port 0 picks a free port.
    pub async fn bind(port: u16, timeout: Duration) -> AuthResult<Self> {
        let addr = format!("127.0.0.1:{}", port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| AuthError::OAuth(format!("Failed to bind to {}: {}", addr, e)))?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            listener,
            port,
            timeout,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn callback_url(&self) -> String {
        format!("http://localhost:{}/callback", self.port)
    }

    /// Serve until a request to `/callback` arrives, returning its `code`.
    ///
    /// A provider error (`?error=...`) or a callback without a code is an
    /// [`AuthError::OAuth`]. No callback within the timeout is
    /// [`AuthError::Timeout`].
    pub async fn wait_for_code(self) -> AuthResult<String> {
        info!(port = self.port, "OAuth callback server listening");

        let (tx, rx) = oneshot::channel::<CallbackResult>();
        let slot: ResultSlot = Arc::new(Mutex::new(Some(tx)));
        let listener = self.listener;

        let server_handle = tokio::spawn({
            let slot = slot.clone();
            async move {
                loop {
                    match listener.accept().await {
                        Ok((socket, _)) => {
                            let slot = slot.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(socket, slot).await {
                                    error!(error = %e, "Error handling callback connection");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Accept error");
                            break;
                        }
                    }
                }
            }
        });

        let outcome = tokio::time::timeout(self.timeout, rx).await;
        server_handle.abort();

        match outcome {
            Ok(Ok(Ok(code))) => Ok(code),
            Ok(Ok(Err(message))) => Err(AuthError::OAuth(message)),
            Ok(Err(_)) => Err(AuthError::OAuth("callback channel closed".to_string())),
            Err(_) => Err(AuthError::Timeout),
        }
    }
}

async fn handle_connection(mut socket: TcpStream, slot: ResultSlot) -> AuthResult<()> {
    let (reader, mut writer) = socket.split();
    let mut reader = BufReader::new(reader);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    debug!(request = %request_line.split('?').next().unwrap_or_default(), "Received callback request");

    let Some(target) = request_line
        .strip_prefix("GET ")
        .and_then(|rest| rest.split_whitespace().next())
    else {
        send_response(&mut writer, 405, "Method Not Allowed", "Method Not Allowed").await?;
        return Ok(());
    };

    let url = url::Url::parse(&format!("http://localhost{}", target))?;
    if url.path() != "/callback" {
        send_response(&mut writer, 404, "Not Found", "Not Found").await?;
        return Ok(());
    }

    let params: HashMap<String, String> = url.query_pairs().into_owned().collect();

    let result = if let Some(err) = params.get("error") {
        let message = params
            .get("error_description")
            .map(|d| format!("{}: {}", err, d))
            .unwrap_or_else(|| err.clone());
        send_response(&mut writer, 200, "OK", &error_page(&message)).await?;
        Err(message)
    } else if let Some(code) = params.get("code").filter(|c| !c.is_empty()) {
        send_response(&mut writer, 200, "OK", &success_page()).await?;
        Ok(code.clone())
    } else {
        let message = "Missing authorization code".to_string();
        send_response(&mut writer, 200, "OK", &error_page(&message)).await?;
        Err(message)
    };

    if let Some(tx) = slot.lock().await.take() {
        let _ = tx.send(result);
    }

    Ok(())
}

async fn send_response(
    writer: &mut tokio::net::tcp::WriteHalf<'_>,
    status_code: u16,
    status_text: &str,
    body: &str,
) -> AuthResult<()> {
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_code,
        status_text,
        body.len(),
        body
    );
    writer.write_all(response.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

fn success_page() -> String {
    r#"<!DOCTYPE html>
<html>
<head><title>Linkshelf - Signed in</title></head>
<body style="font-family: system-ui; text-align: center; padding: 50px; background: #f5f5f5;">
<div style="max-width: 400px; margin: 0 auto; background: white; padding: 40px; border-radius: 8px;">
<h1 style="color: #22c55e;">Signed in</h1>
<p style="color: #666;">You can close this window and return to the terminal.</p>
</div>
<script>setTimeout(() => window.close(), 2000);</script>
</body>
</html>"#
        .to_string()
}

fn error_page(error: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>Linkshelf - Sign-in failed</title></head>
<body style="font-family: system-ui; text-align: center; padding: 50px; background: #f5f5f5;">
<div style="max-width: 400px; margin: 0 auto; background: white; padding: 40px; border-radius: 8px;">
<h1 style="color: #ef4444;">Sign-in failed</h1>
<p style="color: #666;">Error: {}</p>
<p style="color: #888; font-size: 14px;">You can close this window and try again.</p>
</div>
</body>
</html>"#,
        html_escape(error)
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn hit(port: u16, path: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream
            .write_all(format!("GET {} HTTP/1.1\r\nHost: localhost\r\n\r\n", path).as_bytes())
            .await
            .unwrap();
        let mut body = String::new();
        stream.read_to_string(&mut body).await.unwrap();
        body
    }

    #[tokio::test]
    async fn test_callback_url_uses_bound_port() {
        let server = OAuthCallbackServer::bind(0, Duration::from_secs(1))
            .await
            .unwrap();
        assert_ne!(server.port(), 0);
        assert_eq!(
            server.callback_url(),
            format!("http://localhost:{}/callback", server.port())
        );
    }

    #[tokio::test]
    async fn test_receives_code() {
        let server = OAuthCallbackServer::bind(0, Duration::from_secs(5))
            .await
            .unwrap();
        let port = server.port();
        let waiter = tokio::spawn(server.wait_for_code());

        let not_found = hit(port, "/favicon.ico").await;
        assert!(not_found.starts_with("HTTP/1.1 404"));

        let page = hit(port, "/callback?code=abc%2D123").await;
        assert!(page.contains("Signed in"));

        assert_eq!(waiter.await.unwrap().unwrap(), "abc-123");
    }

    #[tokio::test]
    async fn test_provider_error_is_reported() {
        let server = OAuthCallbackServer::bind(0, Duration::from_secs(5))
            .await
            .unwrap();
        let port = server.port();
        let waiter = tokio::spawn(server.wait_for_code());

        let page = hit(
            port,
            "/callback?error=access_denied&error_description=User+cancelled",
        )
        .await;
        assert!(page.contains("access_denied: User cancelled"));

        match waiter.await.unwrap() {
            Err(AuthError::OAuth(msg)) => assert_eq!(msg, "access_denied: User cancelled"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_code_is_an_error() {
        let server = OAuthCallbackServer::bind(0, Duration::from_secs(5))
            .await
            .unwrap();
        let port = server.port();
        let waiter = tokio::spawn(server.wait_for_code());

        hit(port, "/callback").await;
        assert!(matches!(waiter.await.unwrap(), Err(AuthError::OAuth(_))));
    }

    #[tokio::test]
    async fn test_times_out_without_callback() {
        let server = OAuthCallbackServer::bind(0, Duration::from_millis(50))
            .await
            .unwrap();
        assert!(matches!(server.wait_for_code().await, Err(AuthError::Timeout)));
    }

    #[test]
    fn test_error_page_escapes_html() {
        let page = error_page("<script>");
        assert!(page.contains("&lt;script&gt;"));
        assert!(!page.contains("Error: <script>"));
    }
}

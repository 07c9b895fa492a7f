use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::trace;

use super::{
    BaseChecker, CheckMetadata, Checker, HostCheckResult, ProbeContext, ProbeError, Protocol,
    TimeoutBounds, TimeoutError,
};

const SMTP_BOUNDS: TimeoutBounds = TimeoutBounds::new(
    Duration::from_secs(5),
    Duration::from_secs(15),
    Duration::from_secs(10),
);

const CLIENT_NAME: &str = "checkmate.monitor";

fn smtp_error(e: impl ToString) -> ProbeError {
    ProbeError::Smtp(e.to_string())
}

/// Read one (possibly multi-line) reply and return its status code.
async fn read_reply<R>(reader: &mut R) -> Result<u16, ProbeError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await.map_err(smtp_error)? == 0 {
            return Err(smtp_error("connection closed by server"));
        }

        let reply = line.trim_end();
        let code = reply
            .get(..3)
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(|| smtp_error(format!("malformed reply: {reply:?}")))?;

        // "250-..." continues, "250 ..." (or a bare "250") ends the reply
        if reply.as_bytes().get(3) != Some(&b'-') {
            trace!("smtp reply: {reply}");
            return Ok(code);
        }
    }
}

async fn command<R, W>(reader: &mut R, writer: &mut W, line: &str) -> Result<u16, ProbeError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(format!("{line}\r\n").as_bytes())
        .await
        .map_err(smtp_error)?;
    writer.flush().await.map_err(smtp_error)?;
    read_reply(reader).await
}

/// Greeting, EHLO (falling back to HELO), then a best-effort QUIT.
pub async fn handshake<S>(stream: S) -> Result<(), ProbeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(read);

    let greeting = read_reply(&mut reader).await?;
    if greeting != 220 {
        return Err(smtp_error(format!("unexpected greeting: {greeting}")));
    }

    let mut code = command(&mut reader, &mut writer, &format!("EHLO {CLIENT_NAME}")).await?;
    if !(200..300).contains(&code) {
        code = command(&mut reader, &mut writer, &format!("HELO {CLIENT_NAME}")).await?;
    }
    if code != 250 {
        return Err(smtp_error(format!("HELO rejected: {code}")));
    }

    let _ = command(&mut reader, &mut writer, "QUIT").await;
    Ok(())
}

/// Connects and completes an SMTP greeting
#[derive(Debug, Clone)]
pub struct SmtpChecker {
    base: BaseChecker,
}

impl SmtpChecker {
    pub fn new() -> Self {
        Self {
            base: BaseChecker::new(SMTP_BOUNDS),
        }
    }

    async fn probe(&self, host: String, port: u16) -> Result<Option<CheckMetadata>, ProbeError> {
        let stream = TcpStream::connect((host.as_str(), port))
            .await
            .map_err(|e| ProbeError::Connect(e.to_string()))?;
        handshake(stream).await?;
        Ok(None)
    }
}

impl Default for SmtpChecker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Checker for SmtpChecker {
    fn protocol(&self) -> Protocol {
        Protocol::SMTP
    }

    async fn check(
        &self,
        ctx: &ProbeContext,
        hosts: &[String],
        port: u16,
    ) -> Vec<HostCheckResult> {
        self.base
            .check_all(ctx, hosts, |host| self.probe(host, port))
            .await
    }

    fn timeout(&self) -> Duration {
        self.base.timeout()
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TimeoutError> {
        self.base.set_timeout(timeout)
    }
}

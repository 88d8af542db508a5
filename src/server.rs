// src/server.rs
//! 网络层：
//! - 监听 TCP 连接，每个连接一个异步任务
//! - 解码请求（RESP Array / 简单文本行），参数为任意字节
//! - 调度到 engine 执行
//! - 以 RESP2 形式回复
use anyhow::{Context, Result, bail};
use std::io::ErrorKind;

use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};
use tracing::{debug, info, warn};

use crate::engine::CommandEngine;

/// 单个 bulk string 的上限（512 MiB，与 Redis 一致）
const MAX_BULK_LEN: usize = 512 * 1024 * 1024;
/// 读取 bulk string 时最多预先分配的字节数
const PREALLOC_LIMIT: usize = 64 * 1024;
/// 单个请求的参数个数上限
const MAX_ARGS: usize = 1024 * 1024;

/// 绑定地址并进入接受循环
pub async fn start(addr: &str, engine: CommandEngine) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, "crab-kv server listening");
    serve(listener, engine).await
}

/// 核心循环: 不断 accept 新连接并 spawn 出去一个异步任务
pub async fn serve(listener: TcpListener, engine: CommandEngine) -> Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        debug!(%peer, "accepted connection");

        // 克隆只复制 Arc
        let engine = engine.clone();
        tokio::spawn(async move {
            engine.metrics().client_connected();
            if let Err(err) = handle_connection(stream, &engine).await {
                warn!(%peer, error = %err, "connection error");
            }
            engine.metrics().client_disconnected();
            debug!(%peer, "disconnected");
        });
    }
}

/// 单个连接的处理逻辑：读一个请求 -> 执行 -> 写回复，直到对端断开
async fn handle_connection(stream: TcpStream, engine: &CommandEngine) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    loop {
        // 请求没读完整就断开的连接，命令不会被执行
        let parts = match read_request(&mut reader).await {
            Ok(Some(parts)) => parts,
            Ok(None) => break,
            Err(e) if is_disconnect(&e) => break,
            Err(e) => {
                // 协议错误：回一个错误后关闭连接
                let msg = format!("-ERR Protocol error: {}\r\n", e);
                let _ = writer.write_all(msg.as_bytes()).await;
                return Err(e);
            }
        };

        // 空行，继续读下一条
        let Some((name, args)) = parts.split_first() else {
            continue;
        };

        let name = String::from_utf8_lossy(name).into_owned();
        let quit = name.eq_ignore_ascii_case("QUIT");
        let out = if quit {
            b"+OK\r\n".to_vec()
        } else {
            engine.execute(&name, args.to_vec()).to_resp()
        };
        writer.write_all(&out).await?;
        if quit {
            break;
        }
    }

    Ok(())
}

fn is_disconnect(err: &anyhow::Error) -> bool {
    err.downcast_ref::<std::io::Error>().is_some_and(|e| {
        matches!(
            e.kind(),
            ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe
        )
    })
}

/// 读取一个完整请求
///
/// - 首字节为 `*`：RESP Array of Bulk Strings，二进制安全
/// - 其他：一行简单文本，按空白切分
///
/// 对端在请求开始前关闭连接时返回 `Ok(None)`。
pub async fn read_request<R>(reader: &mut R) -> Result<Option<Vec<Vec<u8>>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    if reader.read_until(b'\n', &mut line).await? == 0 {
        return Ok(None);
    }

    if line.first() != Some(&b'*') {
        let parts = trim_crlf(&line)
            .split(|b| b.is_ascii_whitespace())
            .filter(|s| !s.is_empty())
            .map(<[u8]>::to_vec)
            .collect();
        return Ok(Some(parts));
    }

    // *<N>\r\n
    let count = parse_len(&line[1..])?;
    if count > MAX_ARGS {
        bail!("invalid multibulk length");
    }
    let mut parts = Vec::with_capacity(count);
    for _ in 0..count {
        // $<len>\r\n
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Err(std::io::Error::from(ErrorKind::UnexpectedEof).into());
        }
        if line.first() != Some(&b'$') {
            bail!("expected '$', got '{}'", String::from_utf8_lossy(trim_crlf(&line)));
        }
        let len = parse_len(&line[1..])?;
        if len > MAX_BULK_LEN {
            bail!("invalid bulk length");
        }

        // payload + 结尾的 "\r\n"；内存随实际到达的数据增长，不按声明的长度预分配
        let mut buf = Vec::with_capacity(len.min(PREALLOC_LIMIT) + 2);
        (&mut *reader).take(len as u64 + 2).read_to_end(&mut buf).await?;
        if buf.len() < len + 2 {
            return Err(std::io::Error::from(ErrorKind::UnexpectedEof).into());
        }
        if &buf[len..] != b"\r\n" {
            bail!("bulk string not terminated by CRLF");
        }
        buf.truncate(len);
        parts.push(buf);
    }
    Ok(Some(parts))
}

fn trim_crlf(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn parse_len(raw: &[u8]) -> Result<usize> {
    let text = std::str::from_utf8(trim_crlf(raw)).context("length is not valid UTF-8")?;
    text.trim()
        .parse::<usize>()
        .with_context(|| format!("invalid length '{}'", text))
}

//! TCP 接入
//!
//! 每个连接一个读任务和一个写任务。读任务按顺序处理命令，
//! 写任务把注册表投递的消息写回套接字。

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use protocol::{
    ClientMessage, Connection, FrameReader, FrameWriter, Listener, ProtocolError, ServerMessage,
    TcpConnection, TcpListener,
};

use crate::registry::{ConnectionId, Outbound, OUTBOUND_CAPACITY};
use crate::server::{MessageHandler, ServerContext};

/// 接受连接直到监听器出错
pub async fn serve(
    mut listener: TcpListener,
    ctx: Arc<ServerContext>,
    max_connections: usize,
) -> anyhow::Result<()> {
    info!(addr = ?listener.local_addr(), max_connections, "开始接受连接");

    loop {
        let conn = match listener.accept().await {
            Ok(conn) => conn,
            Err(ProtocolError::Io(e)) => {
                warn!(error = %e, "接受连接失败");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        if ctx.registry.len().await >= max_connections {
            reject(conn).await;
            continue;
        }

        spawn_connection(conn, ctx.clone()).await;
    }
}

/// 超出连接上限：回一条错误后关闭
async fn reject(conn: TcpConnection) {
    let (_reader, mut writer) = conn.split();
    warn!("连接数已满，拒绝新连接");
    if let Err(e) = writer
        .write_frame(&ServerMessage::error("Error: server is full"))
        .await
    {
        debug!(error = %e, "发送拒绝消息失败");
    }
    if let Err(e) = writer.shutdown().await {
        debug!(error = %e, "关闭被拒连接失败");
    }
}

async fn spawn_connection(conn: TcpConnection, ctx: Arc<ServerContext>) {
    let peer = conn.peer_addr();
    let (reader, writer) = conn.split();

    let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
    let id = ctx.registry.register(tx).await;
    info!(conn = id, ?peer, "新连接");

    tokio::spawn(write_loop(id, writer, rx));
    tokio::spawn(read_loop(id, reader, ctx));
}

/// 发送端被移出注册表（慢连接）或收到 Close 时关闭写端
async fn write_loop<W>(
    id: ConnectionId,
    mut writer: FrameWriter<W>,
    mut rx: mpsc::Receiver<Outbound>,
) where
    W: tokio::io::AsyncWrite + Unpin + Send,
{
    while let Some(Outbound::Message(msg)) = rx.recv().await {
        debug!(conn = id, kind = msg.kind(), "发送消息");
        if let Err(e) = writer.write_frame(&msg).await {
            debug!(conn = id, error = %e, "写入失败，停止发送");
            return;
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!(conn = id, error = %e, "关闭写端失败");
    }
}

async fn read_loop<R>(id: ConnectionId, mut reader: FrameReader<R>, ctx: Arc<ServerContext>)
where
    R: tokio::io::AsyncRead + Unpin + Send,
{
    loop {
        let msg = match reader.read_payload().await {
            Ok(payload) => serde_json::from_slice::<ClientMessage>(payload),
            Err(ProtocolError::ConnectionClosed) => break,
            Err(e) => {
                warn!(conn = id, error = %e, "读取失败，断开连接");
                break;
            }
        };

        match msg {
            Ok(msg) => MessageHandler::handle(&ctx, id, msg).await,
            Err(e) => {
                // 帧完整但内容无法解析，连接保持
                ctx.registry
                    .send_error(id, format!("Error: malformed command: {}", e))
                    .await;
            }
        }
    }

    MessageHandler::handle_disconnect(&ctx, id).await;
}

//! 会话协议处理
//!
//! 每条命令先解析身份和对局，失败时只给发送者回错误。
//! 同一对局的命令在对局锁内串行执行：读取 -> 校验 -> 执行 -> 保存 -> 广播。
//! 保存失败时不做任何广播。

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use protocol::{ChessError, ClientMessage, Color, GameId, GameStatus, Move, Position, ServerMessage};

use crate::config::{ServerConfig, StorageKind};
use crate::registry::{ConnectionId, ConnectionRegistry};
use crate::session::{Role, SessionLocks};
use crate::storage::FileGameStore;
use crate::store::{AuthStore, GameData, GameStore, MemoryStore, StoreError, StoredGame};

/// 会话错误，文本直接发给客户端
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Error: unauthorized")]
    Unauthorized,

    #[error("Error: game {0} not found")]
    GameNotFound(GameId),

    #[error("Error: you are not a player in this game")]
    NotAPlayer,

    #[error("Error: the game is already over")]
    GameOver,

    #[error("Error: It is not your turn.")]
    NotYourTurn,

    #[error("Error: there is no piece at {0}")]
    NoPiece(Position),

    #[error("Error: the piece at {0} is not yours")]
    NotYourPiece(Position),

    #[error("Error: you are not connected to game {0}")]
    NotInGame(GameId),

    #[error("Error: MAKE_MOVE requires a move")]
    MissingMove,

    #[error("Error: illegal move {0}")]
    IllegalMove(Move),

    #[error("Error: game storage failed, please retry")]
    Persistence(#[from] StoreError),
}

impl SessionError {
    fn from_chess(err: ChessError, mv: Move) -> Self {
        match err {
            ChessError::GameOver => SessionError::GameOver,
            ChessError::NotYourTurn => SessionError::NotYourTurn,
            ChessError::NoPiece { pos } => SessionError::NoPiece(pos),
            _ => SessionError::IllegalMove(mv),
        }
    }
}

/// 服务端上下文，进程内构造一次，所有连接共享
pub struct ServerContext {
    pub registry: ConnectionRegistry,
    pub auth: Arc<dyn AuthStore>,
    pub games: Arc<dyn GameStore>,
    pub locks: SessionLocks,
}

impl ServerContext {
    pub fn new(auth: Arc<dyn AuthStore>, games: Arc<dyn GameStore>) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            auth,
            games,
            locks: SessionLocks::new(),
        }
    }

    /// 按配置构造：预置用户、选择存储并补齐预置对局
    pub async fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        let memory = Arc::new(MemoryStore::new());
        for user in &config.users {
            memory.add_token(user.token.clone(), user.username.clone()).await;
        }

        let games: Arc<dyn GameStore> = match &config.storage {
            StorageKind::Memory => memory.clone(),
            StorageKind::File { dir: Some(dir) } => Arc::new(FileGameStore::new(dir)?),
            StorageKind::File { dir: None } => Arc::new(FileGameStore::open_default()?),
        };

        for entry in &config.games {
            if games.load_game(entry.id).await?.is_some() {
                continue;
            }
            let mut data = GameData::new(entry.id, entry.name.clone());
            if let Some(white) = &entry.white {
                data.seat_player(Color::White, white.clone());
            }
            if let Some(black) = &entry.black {
                data.seat_player(Color::Black, black.clone());
            }
            games.save_game(&data, 0).await?;
            info!(game_id = entry.id, name = %entry.name, "已创建预置对局");
        }

        Ok(Self::new(memory, games))
    }
}

/// 消息处理器
pub struct MessageHandler;

impl MessageHandler {
    /// 处理客户端命令，错误只回给发送者
    pub async fn handle(ctx: &ServerContext, conn: ConnectionId, msg: ClientMessage) {
        let command = msg.command();
        let game_id = msg.game_id();
        debug!(conn, command, game_id, "收到命令");

        let result = match msg {
            ClientMessage::Connect {
                auth_token,
                game_id,
            } => Self::handle_connect(ctx, conn, &auth_token, game_id).await,
            ClientMessage::MakeMove {
                auth_token,
                game_id,
                mv,
            } => Self::handle_make_move(ctx, conn, &auth_token, game_id, mv).await,
            ClientMessage::Leave {
                auth_token,
                game_id,
            } => Self::handle_leave(ctx, conn, &auth_token, game_id).await,
            ClientMessage::Resign {
                auth_token,
                game_id,
            } => Self::handle_resign(ctx, conn, &auth_token, game_id).await,
        };

        if let Err(err) = result {
            match &err {
                SessionError::Persistence(source) => {
                    warn!(conn, command, game_id, error = %source, "存储失败")
                }
                _ => debug!(conn, command, game_id, error = %err, "命令被拒绝"),
            }
            ctx.registry.send_error(conn, err.to_string()).await;
        }
    }

    /// 连接断开：解除关联并注销，座位保留以便重连
    pub async fn handle_disconnect(ctx: &ServerContext, conn: ConnectionId) {
        let game_id = ctx.registry.game_of(conn).await;
        ctx.registry.detach(conn).await;
        ctx.registry.unregister(conn).await;
        info!(conn, ?game_id, "连接断开");
    }

    async fn authenticate(ctx: &ServerContext, token: &str) -> Result<String, SessionError> {
        ctx.auth
            .resolve_auth(token)
            .await?
            .ok_or(SessionError::Unauthorized)
    }

    async fn load(ctx: &ServerContext, game_id: GameId) -> Result<StoredGame, SessionError> {
        ctx.games
            .load_game(game_id)
            .await?
            .ok_or(SessionError::GameNotFound(game_id))
    }

    /// 处理进入对局
    async fn handle_connect(
        ctx: &ServerContext,
        conn: ConnectionId,
        token: &str,
        game_id: GameId,
    ) -> Result<(), SessionError> {
        let username = Self::authenticate(ctx, token).await?;
        let _guard = ctx.locks.lock(game_id).await;
        let stored = Self::load(ctx, game_id).await?;

        let role = Role::of(&stored.data, &username);
        ctx.registry.attach(conn, game_id).await;
        ctx.registry
            .send_to(conn, ServerMessage::load_game(stored.data.game))
            .await;

        let text = match role.color() {
            Some(color) => format!("{} has joined the game as {}.", username, color),
            None => format!("{} is now observing the game.", username),
        };
        ctx.registry
            .broadcast_to_others(conn, game_id, ServerMessage::notification(text))
            .await;

        info!(conn, game_id, %username, %role, "进入对局");
        Ok(())
    }

    /// 处理走棋
    async fn handle_make_move(
        ctx: &ServerContext,
        conn: ConnectionId,
        token: &str,
        game_id: GameId,
        mv: Option<Move>,
    ) -> Result<(), SessionError> {
        let username = Self::authenticate(ctx, token).await?;
        let mv = mv.ok_or(SessionError::MissingMove)?;

        let _guard = ctx.locks.lock(game_id).await;
        let StoredGame { mut data, version } = Self::load(ctx, game_id).await?;

        if data.player_color(&username).is_none() {
            return Err(SessionError::NotAPlayer);
        }
        if data.game.is_over() {
            return Err(SessionError::GameOver);
        }

        // 同时占两个座位时按行棋方走
        let color = data.game.turn();
        if !data.is_seated(&username, color) {
            return Err(SessionError::NotYourTurn);
        }

        let piece = data
            .game
            .board()
            .get(mv.from)
            .ok_or(SessionError::NoPiece(mv.from))?;
        if piece.color != color {
            return Err(SessionError::NotYourPiece(mv.from));
        }

        let next = data
            .game
            .after_move(mv)
            .map_err(|err| SessionError::from_chess(err, mv))?;
        data.game = next;

        let new_version = ctx.games.save_game(&data, version).await?;

        let opponent = color.opponent();
        let text = match data.game.status() {
            GameStatus::Checkmate { .. } => format!("Checkmate! {} is the winner.", username),
            GameStatus::Stalemate => "Stalemate! The game ends in a draw.".to_string(),
            _ if data.game.is_in_check(opponent) => {
                format!("{} is in check.", data.display_name(opponent))
            }
            _ => format!("{} made a move: {}", username, mv),
        };

        let refreshed = ServerMessage::load_game(data.game);
        ctx.registry
            .broadcast_to_others(conn, game_id, ServerMessage::notification(text))
            .await;
        ctx.registry
            .broadcast_to_others(conn, game_id, refreshed.clone())
            .await;
        ctx.registry.send_to(conn, refreshed).await;

        info!(conn, game_id, %username, %mv, version = new_version, "走棋");
        Ok(())
    }

    /// 处理认输
    async fn handle_resign(
        ctx: &ServerContext,
        conn: ConnectionId,
        token: &str,
        game_id: GameId,
    ) -> Result<(), SessionError> {
        let username = Self::authenticate(ctx, token).await?;
        let _guard = ctx.locks.lock(game_id).await;
        let StoredGame { mut data, version } = Self::load(ctx, game_id).await?;

        let Some(seat) = data.player_color(&username) else {
            return Err(SessionError::NotAPlayer);
        };

        // 同时占两个座位时行棋方认输
        let turn = data.game.turn();
        let color = if data.is_seated(&username, turn) { turn } else { seat };

        data.game.resign(color).map_err(|_| SessionError::GameOver)?;
        ctx.games.save_game(&data, version).await?;

        let winner = data.display_name(color.opponent());
        ctx.registry
            .send_to(
                conn,
                ServerMessage::notification(format!("You resigned, {} wins", winner)),
            )
            .await;
        ctx.registry
            .broadcast_to_others(
                conn,
                game_id,
                ServerMessage::notification(format!("{} resigned, {} wins", username, winner)),
            )
            .await;

        info!(conn, game_id, %username, "认输");
        Ok(())
    }

    /// 处理离开对局
    async fn handle_leave(
        ctx: &ServerContext,
        conn: ConnectionId,
        token: &str,
        game_id: GameId,
    ) -> Result<(), SessionError> {
        let username = Self::authenticate(ctx, token).await?;
        // 只能离开自己所在的对局
        if ctx.registry.game_of(conn).await != Some(game_id) {
            return Err(SessionError::NotInGame(game_id));
        }
        let _guard = ctx.locks.lock(game_id).await;
        let StoredGame { mut data, version } = Self::load(ctx, game_id).await?;

        let role = Role::of(&data, &username);
        let text = if role.is_player() {
            for color in [Color::White, Color::Black] {
                if data.is_seated(&username, color) {
                    data.vacate(color);
                }
            }
            ctx.games.save_game(&data, version).await?;
            format!("{} left the game", username)
        } else {
            format!("{} stopped observing the game", username)
        };

        ctx.registry
            .broadcast_to_others(conn, game_id, ServerMessage::notification(text))
            .await;
        ctx.registry.detach(conn).await;
        ctx.registry.close(conn).await;

        info!(conn, game_id, %username, %role, "离开对局");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use protocol::{Game, Piece, PieceKind};
    use tokio::sync::mpsc;

    use crate::registry::{Outbound, OUTBOUND_CAPACITY};

    struct Client {
        conn: ConnectionId,
        token: &'static str,
        rx: mpsc::Receiver<Outbound>,
    }

    impl Client {
        fn drain(&mut self) -> Vec<Outbound> {
            let mut out = Vec::new();
            while let Ok(item) = self.rx.try_recv() {
                out.push(item);
            }
            out
        }

        fn messages(&mut self) -> Vec<ServerMessage> {
            self.drain()
                .into_iter()
                .filter_map(|out| match out {
                    Outbound::Message(msg) => Some(msg),
                    Outbound::Close => None,
                })
                .collect()
        }
    }

    struct Fixture {
        ctx: Arc<ServerContext>,
        store: Arc<MemoryStore>,
        game_id: GameId,
    }

    impl Fixture {
        async fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            store.add_token("t-alice", "alice").await;
            store.add_token("t-bob", "bob").await;
            store.add_token("t-carol", "carol").await;
            let game_id = store.create_game("test", Some("alice"), Some("bob")).await;

            let ctx = Arc::new(ServerContext::new(store.clone(), store.clone()));
            Self {
                ctx,
                store,
                game_id,
            }
        }

        async fn client(&self, token: &'static str) -> Client {
            let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
            let conn = self.ctx.registry.register(tx).await;
            Client { conn, token, rx }
        }

        async fn send(&self, client: &Client, msg: ClientMessage) {
            MessageHandler::handle(&self.ctx, client.conn, msg).await;
        }

        async fn connect(&self, client: &Client) {
            self.send(
                client,
                ClientMessage::Connect {
                    auth_token: client.token.to_string(),
                    game_id: self.game_id,
                },
            )
            .await;
        }

        async fn make_move(&self, client: &Client, text: &str) {
            self.send(
                client,
                ClientMessage::MakeMove {
                    auth_token: client.token.to_string(),
                    game_id: self.game_id,
                    mv: Some(text.parse().unwrap()),
                },
            )
            .await;
        }

        async fn stored(&self) -> StoredGame {
            self.store.load_game(self.game_id).await.unwrap().unwrap()
        }

        /// alice 执白，bob 执黑，都已进入对局且消息已清空
        async fn seated(&self) -> (Client, Client) {
            let mut alice = self.client("t-alice").await;
            let mut bob = self.client("t-bob").await;
            self.connect(&alice).await;
            self.connect(&bob).await;
            alice.drain();
            bob.drain();
            (alice, bob)
        }
    }

    fn notification(text: &str) -> ServerMessage {
        ServerMessage::notification(text)
    }

    fn is_error(msg: &ServerMessage, needle: &str) -> bool {
        matches!(msg, ServerMessage::Error { error_message }
            if error_message.starts_with("Error:") && error_message.contains(needle))
    }

    #[tokio::test]
    async fn test_connect_as_player_and_observer() {
        let fx = Fixture::new().await;
        let mut alice = fx.client("t-alice").await;
        let mut bob = fx.client("t-bob").await;
        let mut carol = fx.client("t-carol").await;

        fx.connect(&alice).await;
        assert_eq!(alice.messages(), vec![ServerMessage::load_game(Game::new())]);

        fx.connect(&bob).await;
        assert_eq!(bob.messages(), vec![ServerMessage::load_game(Game::new())]);
        assert_eq!(
            alice.messages(),
            vec![notification("bob has joined the game as black.")]
        );

        fx.connect(&carol).await;
        let observing = notification("carol is now observing the game.");
        assert_eq!(alice.messages(), vec![observing.clone()]);
        assert_eq!(bob.messages(), vec![observing]);
        assert_eq!(carol.messages().len(), 1);

        assert_eq!(
            fx.ctx.registry.participants(fx.game_id).await,
            vec![alice.conn, bob.conn, carol.conn]
        );
    }

    #[tokio::test]
    async fn test_game_locks_released_after_commands() {
        let fx = Fixture::new().await;
        let mut alice = fx.client("t-alice").await;

        for game_id in 1000..1100 {
            fx.send(
                &alice,
                ClientMessage::Connect {
                    auth_token: "t-alice".to_string(),
                    game_id,
                },
            )
            .await;
        }
        assert_eq!(alice.messages().len(), 100);
        assert!(fx.ctx.locks.is_empty());

        fx.connect(&alice).await;
        fx.make_move(&alice, "e2e4").await;
        assert!(fx.ctx.locks.is_empty());
    }

    #[tokio::test]
    async fn test_move_fan_out_counts() {
        let fx = Fixture::new().await;
        let (mut alice, mut bob) = fx.seated().await;

        fx.make_move(&alice, "e2e4").await;

        let expected = Game::new().after_move("e2e4".parse().unwrap()).unwrap();

        // 对手：恰好一条通知和一条局面
        assert_eq!(
            bob.messages(),
            vec![
                notification("alice made a move: e2e4"),
                ServerMessage::load_game(expected.clone()),
            ]
        );
        // 走棋方：只收到单独发送的局面
        assert_eq!(alice.messages(), vec![ServerMessage::load_game(expected)]);

        let stored = fx.stored().await;
        assert_eq!(stored.version, 2);
        assert_eq!(
            stored.data.game.board().get(Position::parse("e4").unwrap()),
            Some(Piece::new(Color::White, PieceKind::Pawn))
        );
    }

    #[tokio::test]
    async fn test_unauthorized_and_not_found() {
        let fx = Fixture::new().await;
        let mut stranger = fx.client("t-nobody").await;

        fx.connect(&stranger).await;
        let messages = stranger.messages();
        assert_eq!(messages.len(), 1);
        assert!(is_error(&messages[0], "unauthorized"));
        assert_eq!(fx.ctx.registry.game_of(stranger.conn).await, None);

        let mut alice = fx.client("t-alice").await;
        fx.send(
            &alice,
            ClientMessage::Connect {
                auth_token: "t-alice".to_string(),
                game_id: 999,
            },
        )
        .await;
        let messages = alice.messages();
        assert_eq!(messages.len(), 1);
        assert!(is_error(&messages[0], "999 not found"));
    }

    #[tokio::test]
    async fn test_rejections_leave_state_unchanged() {
        let fx = Fixture::new().await;
        let (mut alice, mut bob) = fx.seated().await;
        let mut carol = fx.client("t-carol").await;
        fx.connect(&carol).await;
        alice.drain();
        bob.drain();
        carol.drain();

        fx.make_move(&bob, "e7e5").await;
        assert!(is_error(&bob.messages()[0], "not your turn"));

        fx.make_move(&alice, "e7e5").await;
        assert!(is_error(&alice.messages()[0], "not yours"));

        fx.make_move(&alice, "e3e4").await;
        assert!(is_error(&alice.messages()[0], "no piece at e3"));

        fx.make_move(&alice, "e2e5").await;
        assert!(is_error(&alice.messages()[0], "illegal move e2e5"));

        fx.make_move(&carol, "e2e4").await;
        assert!(is_error(&carol.messages()[0], "not a player"));

        fx.send(
            &alice,
            ClientMessage::MakeMove {
                auth_token: "t-alice".to_string(),
                game_id: fx.game_id,
                mv: None,
            },
        )
        .await;
        assert!(is_error(&alice.messages()[0], "requires a move"));

        // 被拒绝的命令不会广播
        assert!(bob.messages().is_empty());
        assert!(carol.messages().is_empty());

        let stored = fx.stored().await;
        assert_eq!(stored.version, 1);
        assert_eq!(stored.data.game, Game::new());
    }

    /// 读取正常、写入总是失败的存储
    struct FailingSaves(Arc<MemoryStore>);

    #[async_trait]
    impl GameStore for FailingSaves {
        async fn load_game(&self, game_id: GameId) -> Result<Option<StoredGame>, StoreError> {
            self.0.load_game(game_id).await
        }

        async fn save_game(&self, _: &GameData, _: u64) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("disk full".to_string()))
        }
    }

    #[tokio::test]
    async fn test_persistence_failure_sends_no_broadcast() {
        let store = Arc::new(MemoryStore::new());
        store.add_token("t-alice", "alice").await;
        store.add_token("t-bob", "bob").await;
        let game_id = store.create_game("g", Some("alice"), Some("bob")).await;

        let ctx = Arc::new(ServerContext::new(
            store.clone(),
            Arc::new(FailingSaves(store.clone())),
        ));
        let fx = Fixture {
            ctx,
            store,
            game_id,
        };
        let (mut alice, mut bob) = fx.seated().await;

        fx.make_move(&alice, "e2e4").await;

        let messages = alice.messages();
        assert_eq!(messages.len(), 1);
        assert!(is_error(&messages[0], "storage"));
        assert!(bob.messages().is_empty());
        assert_eq!(fx.stored().await.data.game, Game::new());
    }

    #[tokio::test]
    async fn test_store_unavailable_is_sender_only_error() {
        let fx = Fixture::new().await;
        let (mut alice, mut bob) = fx.seated().await;

        fx.store.set_unavailable(true);
        fx.make_move(&alice, "e2e4").await;
        fx.store.set_unavailable(false);

        let messages = alice.messages();
        assert_eq!(messages.len(), 1);
        assert!(matches!(messages[0], ServerMessage::Error { .. }));
        assert!(bob.messages().is_empty());

        // 恢复后可以重试
        fx.make_move(&alice, "e2e4").await;
        assert_eq!(alice.messages().len(), 1);
        assert_eq!(bob.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_check_and_checkmate_notifications() {
        let fx = Fixture::new().await;
        let (mut alice, mut bob) = fx.seated().await;

        fx.make_move(&alice, "e2e4").await;
        fx.make_move(&bob, "f7f6").await;
        alice.drain();
        bob.drain();
        fx.make_move(&alice, "d1h5").await;
        assert_eq!(bob.messages()[0], notification("bob is in check."));

        let fx = Fixture::new().await;
        let (mut alice, mut bob) = fx.seated().await;
        for (client, text) in [(&alice, "f2f3"), (&bob, "e7e5"), (&alice, "g2g4")] {
            fx.make_move(client, text).await;
        }
        alice.drain();
        fx.make_move(&bob, "d8h4").await;

        let messages = alice.messages();
        assert_eq!(messages[0], notification("Checkmate! bob is the winner."));
        match &messages[1] {
            ServerMessage::LoadGame { game } => {
                assert!(game.is_in_checkmate(Color::White));
                assert_eq!(
                    game.status(),
                    GameStatus::Checkmate {
                        winner: Color::Black
                    }
                );
            }
            other => panic!("Unexpected message: {:?}", other),
        }

        fx.make_move(&alice, "a2a3").await;
        assert!(is_error(&alice.messages()[0], "already over"));
    }

    #[tokio::test]
    async fn test_resign() {
        let fx = Fixture::new().await;
        let (mut alice, mut bob) = fx.seated().await;
        let mut carol = fx.client("t-carol").await;
        fx.connect(&carol).await;
        alice.drain();
        bob.drain();

        let resign = |token: &str| ClientMessage::Resign {
            auth_token: token.to_string(),
            game_id: fx.game_id,
        };

        fx.send(&carol, resign("t-carol")).await;
        assert!(is_error(&carol.messages()[0], "not a player"));

        fx.send(&alice, resign("t-alice")).await;
        assert_eq!(alice.messages(), vec![notification("You resigned, bob wins")]);
        assert_eq!(bob.messages(), vec![notification("alice resigned, bob wins")]);
        assert_eq!(carol.messages(), vec![notification("alice resigned, bob wins")]);

        assert_eq!(
            fx.stored().await.data.game.status(),
            GameStatus::Resigned {
                winner: Color::Black
            }
        );

        fx.send(&bob, resign("t-bob")).await;
        assert!(is_error(&bob.messages()[0], "already over"));
        fx.make_move(&bob, "e7e5").await;
        assert!(is_error(&bob.messages()[0], "already over"));
    }

    #[tokio::test]
    async fn test_leave_vacates_seat_and_closes() {
        let fx = Fixture::new().await;
        let (mut alice, mut bob) = fx.seated().await;
        let mut carol = fx.client("t-carol").await;
        fx.connect(&carol).await;
        alice.drain();
        bob.drain();

        fx.send(
            &carol,
            ClientMessage::Leave {
                auth_token: "t-carol".to_string(),
                game_id: fx.game_id,
            },
        )
        .await;
        assert_eq!(carol.drain(), vec![Outbound::Close]);
        assert_eq!(
            alice.messages(),
            vec![notification("carol stopped observing the game")]
        );
        assert_eq!(fx.stored().await.version, 1);

        fx.send(
            &bob,
            ClientMessage::Leave {
                auth_token: "t-bob".to_string(),
                game_id: fx.game_id,
            },
        )
        .await;
        assert_eq!(bob.drain(), vec![Outbound::Close]);
        assert_eq!(alice.messages(), vec![notification("bob left the game")]);
        assert_eq!(fx.ctx.registry.game_of(bob.conn).await, None);
        assert_eq!(fx.ctx.registry.participants(fx.game_id).await, vec![alice.conn]);

        let stored = fx.stored().await;
        assert_eq!(stored.data.black_username, None);
        assert_eq!(stored.data.white_username.as_deref(), Some("alice"));

        // 空出的座位可以由新玩家入座
        let mut data = stored.data;
        data.seat_player(Color::Black, "carol");
        fx.store.save_game(&data, stored.version).await.unwrap();
        let mut carol = fx.client("t-carol").await;
        fx.connect(&carol).await;
        assert_eq!(
            alice.messages(),
            vec![notification("carol has joined the game as black.")]
        );
    }

    #[tokio::test]
    async fn test_leave_for_other_game_is_rejected() {
        let fx = Fixture::new().await;
        let (mut alice, mut bob) = fx.seated().await;
        let other = fx.store.create_game("other", Some("alice"), None).await;

        fx.send(
            &alice,
            ClientMessage::Leave {
                auth_token: "t-alice".to_string(),
                game_id: other,
            },
        )
        .await;

        let messages = alice.drain();
        assert_eq!(messages.len(), 1);
        assert!(matches!(&messages[0], Outbound::Message(msg) if is_error(msg, "not connected")));
        assert!(bob.messages().is_empty());

        // 仍留在原对局，两个对局的座位都不变
        assert_eq!(fx.ctx.registry.game_of(alice.conn).await, Some(fx.game_id));
        let stored = fx.store.load_game(other).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.data.white_username.as_deref(), Some("alice"));
        assert_eq!(fx.stored().await.data.white_username.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_disconnect_keeps_seat() {
        let fx = Fixture::new().await;
        let (mut alice, bob) = fx.seated().await;

        MessageHandler::handle_disconnect(&fx.ctx, bob.conn).await;
        assert_eq!(fx.ctx.registry.len().await, 1);
        assert_eq!(fx.ctx.registry.participants(fx.game_id).await, vec![alice.conn]);
        assert_eq!(fx.stored().await.data.black_username.as_deref(), Some("bob"));

        // 对手不在线时走棋照常
        fx.make_move(&alice, "e2e4").await;
        assert_eq!(alice.messages().len(), 1);

        // 重连后拿到最新局面
        let mut bob = fx.client("t-bob").await;
        fx.connect(&bob).await;
        match &bob.messages()[0] {
            ServerMessage::LoadGame { game } => assert_eq!(game.turn(), Color::Black),
            other => panic!("Unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_context_from_config() {
        use crate::config::{GameEntry, UserEntry};

        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = ServerConfig {
            storage: StorageKind::File {
                dir: Some(temp_dir.path().to_path_buf()),
            },
            users: vec![UserEntry {
                token: "t-alice".to_string(),
                username: "alice".to_string(),
            }],
            games: vec![GameEntry {
                id: 5,
                name: "seeded".to_string(),
                white: Some("alice".to_string()),
                black: None,
            }],
            ..ServerConfig::default()
        };

        let ctx = ServerContext::from_config(&config).await.unwrap();
        assert_eq!(
            ctx.auth.resolve_auth("t-alice").await.unwrap(),
            Some("alice".to_string())
        );
        let stored = ctx.games.load_game(5).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.data.seat(Color::White), Some("alice"));

        // 已存在的预置对局不会被覆盖
        let mut data = stored.data;
        data.game.apply_move("e2e4".parse().unwrap()).unwrap();
        ctx.games.save_game(&data, 1).await.unwrap();

        let again = ServerContext::from_config(&config).await.unwrap();
        assert_eq!(again.games.load_game(5).await.unwrap().unwrap().version, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_moves_apply_once() {
        for _ in 0..20 {
            let fx = Arc::new(Fixture::new().await);
            let (mut first, _bob) = fx.seated().await;
            // 同一玩家的第二个连接
            let mut second = fx.client("t-alice").await;
            fx.connect(&second).await;
            first.drain();
            second.drain();

            let a = {
                let fx = fx.clone();
                let conn = first.conn;
                tokio::spawn(async move {
                    let msg = ClientMessage::MakeMove {
                        auth_token: "t-alice".to_string(),
                        game_id: fx.game_id,
                        mv: Some("e2e4".parse().unwrap()),
                    };
                    MessageHandler::handle(&fx.ctx, conn, msg).await;
                })
            };
            let b = {
                let fx = fx.clone();
                let conn = second.conn;
                tokio::spawn(async move {
                    let msg = ClientMessage::MakeMove {
                        auth_token: "t-alice".to_string(),
                        game_id: fx.game_id,
                        mv: Some("d2d4".parse().unwrap()),
                    };
                    MessageHandler::handle(&fx.ctx, conn, msg).await;
                })
            };
            a.await.unwrap();
            b.await.unwrap();

            let stored = fx.stored().await;
            assert_eq!(stored.version, 2);
            assert_eq!(stored.data.game.turn(), Color::Black);

            let board = stored.data.game.board();
            let moved_e = board.get(Position::parse("e4").unwrap()).is_some();
            let moved_d = board.get(Position::parse("d4").unwrap()).is_some();
            assert!(moved_e ^ moved_d);

            let errors = first
                .messages()
                .into_iter()
                .chain(second.messages())
                .filter(|msg| is_error(msg, "not your turn"))
                .count();
            assert_eq!(errors, 1);
            assert!(fx.ctx.locks.is_empty());
        }
    }
}

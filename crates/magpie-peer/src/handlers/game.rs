//! Tic-tac-toe over datagrams
//!
//! The inviter plays X and moves first. Both sides track the board locally
//! and detect the end of the game themselves; the player making the final
//! move also sends an explicit result message.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use magpie_core::{new_message_id, unix_now, Message, Result, Scope, Transport, TOKEN_TTL};
use tracing::{debug, info};

use crate::context::Context;
use crate::display;

const EMPTY: char = ' ';

#[derive(Clone, Debug)]
pub struct Game {
    pub board: [char; 9],
    pub my_symbol: char,
    pub opponent: String,
    pub opponent_addr: SocketAddr,
    pub my_turn: bool,
    pub finished: bool,
}

impl Game {
    fn new(my_symbol: char, opponent: String, opponent_addr: SocketAddr, my_turn: bool) -> Self {
        Self {
            board: [EMPTY; 9],
            my_symbol,
            opponent,
            opponent_addr,
            my_turn,
            finished: false,
        }
    }
}

/// Winning symbol, if any line of three is filled
fn winner(board: &[char; 9]) -> Option<char> {
    const LINES: [[usize; 3]; 8] = [
        [0, 1, 2],
        [3, 4, 5],
        [6, 7, 8],
        [0, 3, 6],
        [1, 4, 7],
        [2, 5, 8],
        [0, 4, 8],
        [2, 4, 6],
    ];
    LINES.iter().find_map(|line| {
        let c = board[line[0]];
        (c != EMPTY && board[line[1]] == c && board[line[2]] == c).then_some(c)
    })
}

fn is_draw(board: &[char; 9]) -> bool {
    winner(board).is_none() && board.iter().all(|&c| c != EMPTY)
}

pub struct GameHandler<T: Transport> {
    ctx: Arc<Context<T>>,
    games: Arc<Mutex<HashMap<String, Game>>>,
}

impl<T: Transport> GameHandler<T> {
    pub fn new(ctx: Arc<Context<T>>) -> Self {
        Self {
            ctx,
            games: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn game_token(&self) -> String {
        self.ctx
            .tokens
            .issue(&self.ctx.full_id(), TOKEN_TTL, Scope::Game)
    }

    /// Invite a peer to a new game; we play X and move first
    pub async fn send_invite(&self, to_user: &str, dest: SocketAddr) -> Result<String> {
        let game_id = new_message_id();
        self.games.lock().unwrap().insert(
            game_id.clone(),
            Game::new('X', to_user.to_string(), dest, true),
        );

        let mut msg = Message::of_type("TICTACTOE_INVITE");
        msg.set("FROM", self.ctx.full_id())
            .set("TO", to_user)
            .set("GAMEID", game_id.clone())
            .set("SYMBOL", "X")
            .set("MESSAGE_ID", new_message_id())
            .set("TIMESTAMP", unix_now().to_string())
            .set("TOKEN", self.game_token());
        self.ctx.send_message(&msg, dest).await?;
        Ok(game_id)
    }

    /// Show an inbound invite and ask the human whether to play. Acceptance
    /// only records local game state; the inviter moves first, so there is
    /// nothing to send back yet.
    pub fn handle_invite(&self, msg: &Message, sender: SocketAddr) {
        let (Some(from), Some(game_id)) = (msg.get("FROM"), msg.get("GAMEID")) else {
            debug!("game invite missing FROM or GAMEID, dropping");
            return;
        };
        display::game_invite(from, game_id);

        let prompts = self.ctx.prompts.clone();
        let games = Arc::clone(&self.games);
        let from = from.to_string();
        let game_id = game_id.to_string();
        tokio::spawn(async move {
            let answer = prompts
                .ask(format!("Play tic-tac-toe with {from}? (y/n): "))
                .await
                .unwrap_or_default();
            if answer.trim().eq_ignore_ascii_case("y") {
                games
                    .lock()
                    .unwrap()
                    .insert(game_id, Game::new('O', from, sender, false));
            } else {
                info!(game_id, "game invite declined");
            }
        });
    }

    /// Play our symbol at `position` (0 to 8, row-major) and notify the
    /// opponent. Sends the result too when this move ends the game.
    pub async fn send_move(&self, game_id: &str, position: usize) -> Result<()> {
        let (mv, outcome) = {
            let mut games = self.games.lock().unwrap();
            let Some(game) = games.get_mut(game_id) else {
                debug!(game_id, "unknown game");
                return Ok(());
            };
            if game.finished || !game.my_turn || position >= 9 || game.board[position] != EMPTY {
                debug!(game_id, position, "move rejected");
                return Ok(());
            }
            game.board[position] = game.my_symbol;
            game.my_turn = false;

            let outcome = if let Some(w) = winner(&game.board) {
                game.finished = true;
                Some(w.to_string())
            } else if is_draw(&game.board) {
                game.finished = true;
                Some("DRAW".to_string())
            } else {
                None
            };
            display::game_board(game_id, &game.board);
            (
                (game.my_symbol, game.opponent.clone(), game.opponent_addr),
                outcome,
            )
        };

        let (symbol, opponent, addr) = mv;
        let mut msg = Message::of_type("TICTACTOE_MOVE");
        msg.set("FROM", self.ctx.full_id())
            .set("TO", opponent.clone())
            .set("GAMEID", game_id)
            .set("POSITION", position.to_string())
            .set("SYMBOL", symbol.to_string())
            .set("MESSAGE_ID", new_message_id())
            .set("TIMESTAMP", unix_now().to_string())
            .set("TOKEN", self.game_token());
        self.ctx.send_message(&msg, addr).await?;

        if let Some(result) = outcome {
            display::game_result(game_id, &describe(&result));
            let mut msg = Message::of_type("TICTACTOE_RESULT");
            msg.set("FROM", self.ctx.full_id())
                .set("TO", opponent)
                .set("GAMEID", game_id)
                .set("RESULT", result)
                .set("MESSAGE_ID", new_message_id())
                .set("TIMESTAMP", unix_now().to_string())
                .set("TOKEN", self.game_token());
            self.ctx.send_message(&msg, addr).await?;
        }
        Ok(())
    }

    /// Apply the opponent's move and detect a finished game locally
    pub fn handle_move(&self, msg: &Message) {
        let (Some(game_id), Some(position), Some(symbol)) = (
            msg.get("GAMEID"),
            msg.get_u32("POSITION"),
            msg.get("SYMBOL").and_then(|s| s.chars().next()),
        ) else {
            debug!("game move missing GAMEID, POSITION or SYMBOL, dropping");
            return;
        };
        let mut games = self.games.lock().unwrap();
        let Some(game) = games.get_mut(game_id) else {
            debug!(game_id, "move for unknown game, dropping");
            return;
        };
        let position = position as usize;
        if game.finished || symbol == game.my_symbol || position >= 9 {
            debug!(game_id, position, "invalid opponent move, dropping");
            return;
        }
        if game.board[position] != EMPTY {
            debug!(game_id, position, "cell already taken, dropping");
            return;
        }
        game.board[position] = symbol;
        game.my_turn = true;
        display::game_board(game_id, &game.board);
        if let Some(w) = winner(&game.board) {
            game.finished = true;
            display::game_result(game_id, &describe(&w.to_string()));
        } else if is_draw(&game.board) {
            game.finished = true;
            display::game_result(game_id, &describe("DRAW"));
        }
    }

    pub fn handle_result(&self, msg: &Message) {
        let (Some(game_id), Some(result)) = (msg.get("GAMEID"), msg.get("RESULT")) else {
            debug!("game result missing GAMEID or RESULT, dropping");
            return;
        };
        if let Some(game) = self
            .games
            .lock()
            .unwrap()
            .get_mut(game_id)
        {
            game.finished = true;
        }
        display::game_result(game_id, &describe(result));
    }

    pub fn game(&self, game_id: &str) -> Option<Game> {
        self.games
            .lock()
            .unwrap()
            .get(game_id)
            .cloned()
    }
}

fn describe(result: &str) -> String {
    match result {
        "DRAW" => "draw".to_string(),
        symbol => format!("{symbol} wins"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::PromptQueue;
    use magpie_core::transport::mock::MockTransport;

    fn handler() -> GameHandler<MockTransport> {
        let (prompts, _rx) = PromptQueue::new();
        let ctx = Context::new(MockTransport::new(), prompts, "alice", "10.0.0.1", 50999);
        GameHandler::new(ctx)
    }

    fn opponent_move(game_id: &str, position: usize, symbol: char) -> Message {
        let mut msg = Message::of_type("TICTACTOE_MOVE");
        msg.set("FROM", "bob@10.0.0.2")
            .set("GAMEID", game_id)
            .set("POSITION", position.to_string())
            .set("SYMBOL", symbol.to_string());
        msg
    }

    #[test]
    fn test_winner_detection() {
        let mut board = [EMPTY; 9];
        assert_eq!(winner(&board), None);
        board[0] = 'X';
        board[4] = 'X';
        board[8] = 'X';
        assert_eq!(winner(&board), Some('X'));

        let drawn = ['X', 'O', 'X', 'X', 'O', 'O', 'O', 'X', 'X'];
        assert_eq!(winner(&drawn), None);
        assert!(is_draw(&drawn));
    }

    #[tokio::test]
    async fn test_invite_creates_game_as_x() {
        let h = handler();
        let dest = "10.0.0.2:50999".parse().unwrap();
        let game_id = h.send_invite("bob@10.0.0.2", dest).await.unwrap();

        let game = h.game(&game_id).unwrap();
        assert_eq!(game.my_symbol, 'X');
        assert!(game.my_turn);

        let sent = h.ctx.transport.sent();
        let msg = Message::decode(&String::from_utf8_lossy(&sent[0].1));
        assert_eq!(msg.msg_type(), Some("TICTACTOE_INVITE"));
        assert!(msg.get("TOKEN").unwrap().ends_with("|game"));
    }

    #[tokio::test]
    async fn test_winning_move_sends_result() {
        let h = handler();
        let dest = "10.0.0.2:50999".parse().unwrap();
        let game_id = h.send_invite("bob@10.0.0.2", dest).await.unwrap();
        h.ctx.transport.drain_sent();

        h.send_move(&game_id, 0).await.unwrap();
        h.handle_move(&opponent_move(&game_id, 3, 'O'));
        h.send_move(&game_id, 1).await.unwrap();
        h.handle_move(&opponent_move(&game_id, 4, 'O'));
        h.send_move(&game_id, 2).await.unwrap();

        let game = h.game(&game_id).unwrap();
        assert!(game.finished);

        let sent = h.ctx.transport.drain_sent();
        let last = Message::decode(&String::from_utf8_lossy(&sent.last().unwrap().1));
        assert_eq!(last.msg_type(), Some("TICTACTOE_RESULT"));
        assert_eq!(last.get("RESULT"), Some("X"));
    }

    #[tokio::test]
    async fn test_out_of_turn_move_rejected() {
        let h = handler();
        let dest = "10.0.0.2:50999".parse().unwrap();
        let game_id = h.send_invite("bob@10.0.0.2", dest).await.unwrap();
        h.ctx.transport.drain_sent();

        h.send_move(&game_id, 0).await.unwrap();
        // Second consecutive move is not our turn
        h.send_move(&game_id, 1).await.unwrap();

        let game = h.game(&game_id).unwrap();
        assert_eq!(game.board[1], EMPTY);
        assert_eq!(h.ctx.transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_opponent_move_on_taken_cell_ignored() {
        let h = handler();
        let dest = "10.0.0.2:50999".parse().unwrap();
        let game_id = h.send_invite("bob@10.0.0.2", dest).await.unwrap();
        h.send_move(&game_id, 0).await.unwrap();

        h.handle_move(&opponent_move(&game_id, 0, 'O'));
        let game = h.game(&game_id).unwrap();
        assert_eq!(game.board[0], 'X');
        assert!(!game.my_turn);
    }
}

//! Terminal output for inbound social events

/// Feed post from a peer
pub fn post(from: &str, content: &str) {
    println!("\n[POST] {from}: {content}");
}

/// Direct message
pub fn dm(from: &str, content: &str) {
    println!("\n[DM] {from}: {content}");
}

/// A peer liked (or unliked) one of our posts
pub fn like(from: &str, liked_message_id: &str) {
    println!("\n[LIKE] {from} liked your post ({liked_message_id})");
}

pub fn follow(from: &str) {
    println!("\n[FOLLOW] {from} is now following you");
}

pub fn unfollow(from: &str) {
    println!("\n[UNFOLLOW] {from} unfollowed you");
}

pub fn profile(user: &str, display_name: &str, status: &str) {
    println!("\n[PROFILE] {user} ({display_name}): {status}");
}

pub fn file_offer(from: &str, filename: &str, size: &str, description: &str) {
    println!("\n[FILE] {from} offers '{filename}' ({size} bytes): {description}");
}

pub fn file_saved(filename: &str, path: &std::path::Path) {
    println!("\n[FILE] '{}' saved to {}", filename, path.display());
}

pub fn file_delivered(to: &str, file_id: &str) {
    println!("\n[FILE] transfer {file_id} to {to} confirmed complete");
}

pub fn group_created(group_name: &str, from: &str) {
    println!("\n[GROUP] {from} added you to '{group_name}'");
}

pub fn group_updated(group_name: &str) {
    println!("\n[GROUP] '{group_name}' membership was updated");
}

pub fn group_message(group_name: &str, from: &str, content: &str) {
    println!("\n[GROUP {group_name}] {from}: {content}");
}

pub fn game_invite(from: &str, game_id: &str) {
    println!("\n[GAME] {from} invites you to tic-tac-toe ({game_id})");
}

/// Render a 3x3 tic-tac-toe board
pub fn game_board(game_id: &str, board: &[char; 9]) {
    println!("\n[GAME {game_id}]");
    for row in board.chunks(3) {
        println!(" {} | {} | {}", row[0], row[1], row[2]);
    }
}

pub fn game_result(game_id: &str, result: &str) {
    println!("\n[GAME {game_id}] {result}");
}

pub fn revoked(token: &str) {
    println!("\n[REVOKE] token revoked: {token}");
}

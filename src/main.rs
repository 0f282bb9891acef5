//! Interactive console driver over the engine facade.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tsurugi::{DrawCause, Game, GameState, MoveFormat, SearchEvent};

fn print_state(game: &Game) {
    match game.game_state() {
        GameState::Active => println!("state: active"),
        GameState::WhiteWin => println!("state: white wins"),
        GameState::BlackWin => println!("state: black wins"),
        GameState::Draw => {
            let cause = match game.draw_cause() {
                Some(DrawCause::Rule50) => "fifty-move rule",
                Some(DrawCause::Material) => "insufficient material",
                Some(DrawCause::ThreefoldRepetition) => "threefold repetition",
                Some(DrawCause::Stalemate) => "stalemate",
                None => "unknown",
            };
            println!("state: draw ({cause})");
        }
    }
}

/// Try the supported text formats in order so users can type any of them.
fn play_move(game: &mut Game, text: &str) {
    for fmt in [MoveFormat::San, MoveFormat::An, MoveFormat::Uci] {
        match game.do_move_text(text, fmt) {
            Ok(()) => {
                print_state(game);
                return;
            }
            Err(tsurugi::EngineError::EngineBusy) => {
                println!("error: end the search first");
                return;
            }
            Err(_) => continue,
        }
    }
    println!("error: '{text}' is not a playable move here");
}

fn main() {
    env_logger::init();
    let mut game = Game::new();
    game.set_search_processer(Arc::new(|event: &SearchEvent| match event {
        SearchEvent::Info { results, stats } => println!(
            "info depth {} score {} best {} nodes {} tthits {}",
            results.depth, results.score, results.best_move, stats.visited_nodes, stats.tt_hits
        ),
        SearchEvent::Finished { results, .. } => println!(
            "finished: best {} score {} depth {}",
            results.best_move, results.score, results.depth
        ),
    }));

    println!("tsurugi chess engine; commands: fen <FEN> | move <m> | undo | go | stop | state | perft <d> | game | options <name> <value> | reset | quit");
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (cmd, rest) = match line.split_once(' ') {
            Some((c, r)) => (c, r.trim()),
            None => (line, ""),
        };
        match cmd {
            "quit" | "exit" => break,
            "reset" => match game.reset() {
                Ok(()) => println!("ok"),
                Err(e) => println!("error: {e}"),
            },
            "fen" => {
                if rest.is_empty() {
                    println!("{}", game.write_fen(false));
                } else {
                    match game.load_fen(rest, false) {
                        Ok(()) => print_state(&game),
                        Err(e) => println!("error: {e}"),
                    }
                }
            }
            "move" => play_move(&mut game, rest),
            "undo" => match game.undo_move() {
                Ok(true) => println!("ok"),
                Ok(false) => println!("nothing to undo"),
                Err(e) => println!("error: {e}"),
            },
            "go" => match game.start_search() {
                Ok(()) => println!("searching..."),
                Err(e) => println!("error: {e}"),
            },
            "stop" => {
                let (results, stats) = game.end_search();
                println!(
                    "best {} score {} depth {} nodes {}",
                    results.best_move, results.score, results.depth, stats.visited_nodes
                );
            }
            "state" => print_state(&game),
            "perft" => match rest.parse::<u32>() {
                Ok(depth) => match game.perft(depth) {
                    Ok(nodes) => println!("perft({depth}) = {nodes}"),
                    Err(e) => println!("error: {e}"),
                },
                Err(_) => println!("error: perft needs a depth"),
            },
            "game" => print!("{}", game.write_game(MoveFormat::San)),
            "options" => match rest.split_once(' ') {
                Some((name, value)) => match game.set_option(name, value.trim()) {
                    Ok(()) => println!("ok"),
                    Err(e) => println!("error: {e}"),
                },
                None => {
                    let o = game.search_options();
                    println!(
                        "TimeLimit {} ThreadCount {} SearchDepth {}",
                        o.time_limit_ms, o.thread_count, o.search_depth
                    );
                }
            },
            _ => println!("error: unknown command '{cmd}'"),
        }
        io::stdout().flush().ok();
    }
    // Make sure no search outlives the console.
    if game.is_in_search() {
        game.end_search();
    }
}

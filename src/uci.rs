use std::{
    collections::VecDeque,
    fmt,
    io::Write,
    path::PathBuf,
    sync::mpsc,
};

use crate::{
    bench,
    chess::{attacks, board::Board, piece::Colour},
    errors::{GoParseError, PositionParseError, SetOptionParseError, UciError},
    evaluation::{evaluate, is_mate_score, MATE_SCORE},
    threadpool::Engine,
    timemgmt::SearchLimits,
    NAME, VERSION,
};

/// A `setoption` command, parsed and range-checked.
#[derive(Debug, Clone, PartialEq, Eq)]
enum OptionCommand {
    Hash(usize),
    Threads(usize),
    MultiPv(usize),
    MoveOverhead(u64),
    SyzygyPath(Option<PathBuf>),
    SyzygyProbeDepth(i32),
    Ponder(bool),
    Chess960(bool),
}

pub struct ScoreDisplay(i32);

impl fmt::Display for ScoreDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if is_mate_score(self.0) {
            let plies_to_mate = MATE_SCORE - self.0.abs();
            let moves_to_mate = (plies_to_mate + 1) / 2;
            if self.0 > 0 {
                write!(f, "mate {moves_to_mate}")
            } else {
                write!(f, "mate -{moves_to_mate}")
            }
        } else {
            write!(f, "cp {}", self.0)
        }
    }
}

/// Renders a score the way the protocol wants it: `cp N`, or `mate N`
/// in full moves once inside the mate band.
pub const fn format_score(score: i32) -> ScoreDisplay {
    ScoreDisplay(score)
}

fn stdin_reader() -> mpsc::Receiver<String> {
    let (sender, receiver) = mpsc::channel();
    std::thread::Builder::new()
        .name("stdin-reader".into())
        .spawn(move || {
            let mut line = String::with_capacity(128);
            while std::io::stdin().read_line(&mut line).is_ok_and(|n| n > 0) {
                let cmd = line.trim();
                if !cmd.is_empty() && sender.send(cmd.to_owned()).is_err() {
                    break;
                }
                line.clear();
            }
        })
        .expect("couldn't start the stdin reader thread");
    receiver
}

/// `position [startpos | fen <FEN>] [moves <m1> <m2> …]`
///
/// Moves arrive in long algebraic notation; anything that does not
/// match a legal move is skipped silently, as controllers are allowed
/// to send premoves.
fn parse_position(text: &str, chess960: bool) -> Result<Board, PositionParseError> {
    let mut parts = text.split_ascii_whitespace().skip(1).peekable();

    let mut board = match parts.next() {
        Some("startpos") => {
            if let Some(&next) = parts.peek() {
                if next != "moves" {
                    return Err(PositionParseError::InvalidStartposSuffix(next.to_string()));
                }
            }
            Board::from_fen(Board::STARTING_FEN, chess960)?
        }
        Some("fen") => {
            let mut fen = String::new();
            while let Some(&part) = parts.peek() {
                if part == "moves" {
                    break;
                }
                fen.push_str(part);
                fen.push(' ');
                parts.next();
            }
            Board::from_fen(fen.trim(), chess960)?
        }
        Some(other) => return Err(PositionParseError::UnknownSpecifier(other.to_string())),
        None => return Err(PositionParseError::MissingSpecifier),
    };

    apply_move_tokens(&mut board, parts);
    Ok(board)
}

fn apply_move_tokens<'a>(board: &mut Board, parts: impl Iterator<Item = &'a str>) {
    use crate::chess::{board::Undo, chessmove::Move};
    let mut undo = Undo::default();
    for token in parts.skip_while(|&t| t == "moves") {
        let Some((from, to, promo)) = Move::parse_fields(token) else {
            // malformed: skip silently.
            continue;
        };
        let legal = board.gen_legal();
        let matched = legal.iter().copied().find(|m| {
            m.from() == from
                && m.promotion_type() == promo
                // castling matches in either encoding: the king's true
                // destination, or king-takes-rook.
                && (m.to() == to || (m.is_castle() && m.history_to_square() == to))
        });
        let Some(m) = matched else {
            // illegal: skip silently, controllers send premoves.
            continue;
        };
        board.apply_move(m, &mut undo);
        // candidate repetitions only reach back to the last zeroing
        // move, so the ring restarts with the fifty-move counter.
        if board.halfmove_clock() == 0 {
            board.reset_hash_history();
        }
    }
}

/// `go [wtime W] [btime B] [winc Wi] [binc Bi] [movestogo M]
///     [depth D] [movetime T] [infinite] [ponder]`
fn parse_go(text: &str, board: &Board) -> Result<SearchLimits, GoParseError> {
    let mut limits = SearchLimits::default();
    let mut parts = parts_after_command(text);

    while let Some(part) = parts.next() {
        match part {
            "depth" => limits.depth = Some(parse_value(&mut parts, "depth")?),
            "movetime" => limits.movetime = Some(parse_value(&mut parts, "movetime")?),
            "movestogo" => limits.moves_to_go = Some(parse_value(&mut parts, "movestogo")?),
            "wtime" => {
                let value = parse_value(&mut parts, "wtime")?;
                if board.turn() == Colour::White {
                    limits.time = Some(value);
                }
            }
            "btime" => {
                let value = parse_value(&mut parts, "btime")?;
                if board.turn() == Colour::Black {
                    limits.time = Some(value);
                }
            }
            "winc" => {
                let value = parse_value(&mut parts, "winc")?;
                if board.turn() == Colour::White {
                    limits.inc = value;
                }
            }
            "binc" => {
                let value = parse_value(&mut parts, "binc")?;
                if board.turn() == Colour::Black {
                    limits.inc = value;
                }
            }
            "infinite" => limits.infinite = true,
            "ponder" => limits.ponder = true,
            // controllers send terms we don't implement; ignore them.
            _ => {}
        }
    }

    Ok(limits)
}

fn parts_after_command(text: &str) -> impl Iterator<Item = &str> {
    text.split_ascii_whitespace().skip(1)
}

fn parse_value<'a, T: std::str::FromStr<Err = std::num::ParseIntError>>(
    parts: &mut impl Iterator<Item = &'a str>,
    param: &'static str,
) -> Result<T, GoParseError> {
    parts
        .next()
        .ok_or(GoParseError::MissingValue(param))?
        .parse()
        .map_err(|source| GoParseError::InvalidValue { param, source })
}

fn parse_setoption(text: &str) -> Result<OptionCommand, SetOptionParseError> {
    let mut parts = parts_after_command(text);
    match parts.next() {
        Some("name") => {}
        _ => return Err(SetOptionParseError::MissingNameKeyword),
    }
    let name = parts
        .next()
        .ok_or(SetOptionParseError::MissingOptionName)?;
    // option names are case-sensitive in the wild but we get sent all
    // sorts; accept the canonical spellings only.
    let value = match parts.next() {
        Some("value") => parts.collect::<Vec<_>>().join(" "),
        _ => String::new(),
    };

    fn spin<T: TryFrom<i64>>(
        name: &'static str,
        value: &str,
        lo: i64,
        hi: i64,
    ) -> Result<T, SetOptionParseError> {
        let parsed: i64 = value
            .parse()
            .map_err(|_| SetOptionParseError::InvalidValue {
                name,
                value: value.to_string(),
            })?;
        if !(lo..=hi).contains(&parsed) {
            return Err(SetOptionParseError::ValueOutOfRange {
                name,
                lo,
                hi,
                got: parsed,
            });
        }
        T::try_from(parsed).map_err(|_| SetOptionParseError::InvalidValue {
            name,
            value: value.to_string(),
        })
    }

    fn check(name: &'static str, value: &str) -> Result<bool, SetOptionParseError> {
        value
            .parse()
            .map_err(|_| SetOptionParseError::InvalidValue {
                name,
                value: value.to_string(),
            })
    }

    match name {
        "Hash" => Ok(OptionCommand::Hash(spin("Hash", &value, 1, 65536)?)),
        "Threads" => Ok(OptionCommand::Threads(spin("Threads", &value, 1, 2048)?)),
        "MultiPV" => Ok(OptionCommand::MultiPv(spin("MultiPV", &value, 1, 256)?)),
        "MoveOverhead" => Ok(OptionCommand::MoveOverhead(spin(
            "MoveOverhead",
            &value,
            0,
            10000,
        )?)),
        "SyzygyPath" => Ok(OptionCommand::SyzygyPath(
            (!value.is_empty() && value != "<empty>").then(|| PathBuf::from(&value)),
        )),
        "SyzygyProbeDepth" => Ok(OptionCommand::SyzygyProbeDepth(spin(
            "SyzygyProbeDepth",
            &value,
            0,
            127,
        )?)),
        "Ponder" => Ok(OptionCommand::Ponder(check("Ponder", &value)?)),
        "UCI_Chess960" => Ok(OptionCommand::Chess960(check("UCI_Chess960", &value)?)),
        other => Err(SetOptionParseError::UnknownOption(other.to_string())),
    }
}

fn apply_option(engine: &mut Engine, option: OptionCommand) {
    match option {
        OptionCommand::Hash(mb) => match engine.set_hash(mb) {
            Ok(()) => println!("info string set Hash to {mb}MB"),
            Err(_) => println!(
                "info string failed to allocate {mb}MB for the hash table, previous size retained"
            ),
        },
        OptionCommand::Threads(n) => {
            engine.set_threads(n);
            println!("info string set Threads to {n}");
        }
        OptionCommand::MultiPv(n) => {
            engine.options.multi_pv = n;
            println!("info string set MultiPV to {n}");
        }
        OptionCommand::MoveOverhead(ms) => {
            engine.options.move_overhead = ms;
            println!("info string set MoveOverhead to {ms}");
        }
        OptionCommand::SyzygyPath(path) => {
            match &path {
                Some(p) => println!("info string set SyzygyPath to {}", p.display()),
                None => println!("info string cleared SyzygyPath"),
            }
            engine.options.syzygy.path = path;
        }
        OptionCommand::SyzygyProbeDepth(depth) => {
            engine.options.syzygy.probe_depth = depth;
            println!("info string set SyzygyProbeDepth to {depth}");
        }
        OptionCommand::Ponder(value) => engine.options.ponder = value,
        OptionCommand::Chess960(value) => {
            engine.options.chess960 = value;
            println!("info string set UCI_Chess960 to {value}");
        }
    }
}

fn print_uci_response() {
    println!("id name {NAME} {VERSION}");
    println!("id author the {NAME} developers");
    println!("option name Hash type spin default 16 min 1 max 65536");
    println!("option name Threads type spin default 1 min 1 max 2048");
    println!("option name MultiPV type spin default 1 min 1 max 256");
    println!("option name MoveOverhead type spin default 100 min 0 max 10000");
    println!("option name SyzygyPath type string default <empty>");
    println!("option name SyzygyProbeDepth type spin default 0 min 0 max 127");
    println!("option name Ponder type check default false");
    println!("option name UCI_Chess960 type check default false");
    println!("uciok");
}

/// The blocking command loop: line-delimited text on stdin, responses
/// on stdout. Searches run to completion inside `go`; control commands
/// that arrive mid-search are routed through the engine's watcher.
pub fn main_loop() -> anyhow::Result<()> {
    attacks::initialise();

    let mut engine = Engine::new();
    let mut board = Board::startpos();
    let stdin = stdin_reader();
    let mut pending: VecDeque<String> = VecDeque::new();

    loop {
        std::io::stdout().flush()?;
        let line = match pending.pop_front() {
            Some(line) => line,
            None => match stdin.recv() {
                Ok(line) => line,
                // stdin closed: controllers treat that as quit.
                Err(_) => break,
            },
        };
        let input = line.trim();

        let result: Result<(), UciError> = match input {
            "uci" => {
                print_uci_response();
                Ok(())
            }
            "isready" => {
                engine.wait_ready();
                println!("readyok");
                Ok(())
            }
            "ucinewgame" => {
                board = Board::from_fen(Board::STARTING_FEN, engine.options.chess960)
                    .expect("STARTING_FEN is broken");
                engine.new_game();
                Ok(())
            }
            "stop" => {
                engine.stop();
                Ok(())
            }
            "ponderhit" => {
                engine.ponderhit();
                Ok(())
            }
            "quit" => break,
            "print" => {
                println!("{board:X}");
                Ok(())
            }
            "eval" => {
                println!("{}", evaluate(&board));
                Ok(())
            }
            _ if input.starts_with("position") => {
                match parse_position(input, engine.options.chess960) {
                    Ok(new_board) => {
                        board = new_board;
                        Ok(())
                    }
                    Err(e) => Err(e.into()),
                }
            }
            _ if input.starts_with("setoption") => match parse_setoption(input) {
                Ok(option) => {
                    apply_option(&mut engine, option);
                    Ok(())
                }
                Err(e) => Err(e.into()),
            },
            _ if input.starts_with("go") => match parse_go(input, &board) {
                Ok(limits) => {
                    let report = engine.search_position(&board, &limits, Some(&stdin));
                    pending.extend(report.pending);
                    match (report.best, report.ponder) {
                        (Some(best), Some(ponder)) => println!(
                            "bestmove {} ponder {}",
                            best.display(board.chess960() || engine.options.chess960),
                            ponder.display(board.chess960() || engine.options.chess960),
                        ),
                        (Some(best), None) => println!(
                            "bestmove {}",
                            best.display(board.chess960() || engine.options.chess960)
                        ),
                        // no legal move: the agreed null-move sentinel.
                        _ => println!("bestmove 0000"),
                    }
                    if report.quit {
                        break;
                    }
                    Ok(())
                }
                Err(e) => Err(e.into()),
            },
            _ if input.starts_with("perft") => {
                match input
                    .split_ascii_whitespace()
                    .nth(1)
                    .and_then(|d| d.parse::<u32>().ok())
                {
                    Some(depth) => {
                        let start = std::time::Instant::now();
                        let nodes = board.clone().perft(depth);
                        let elapsed = start.elapsed();
                        println!(
                            "info string perft({depth}) = {nodes} in {}ms",
                            elapsed.as_millis()
                        );
                        Ok(())
                    }
                    None => Err(UciError::PerftMissingDepth),
                }
            }
            _ if input.starts_with("bench") => {
                let mut args = input.split_ascii_whitespace().skip(1);
                let depth = args.next().and_then(|a| a.parse().ok());
                let threads = args.next().and_then(|a| a.parse().ok());
                let hash = args.next().and_then(|a| a.parse().ok());
                bench::run(
                    depth.unwrap_or(bench::DEFAULT_DEPTH),
                    threads.unwrap_or(1),
                    hash.unwrap_or(16),
                )
                .map_err(|e| UciError::UnknownCommand(e.to_string()))
            }
            other => Err(UciError::UnknownCommand(other.to_string())),
        };

        if let Err(e) = result {
            // recoverable: report and await the next command.
            println!("info string {e}");
        }
    }

    engine.stop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chess::types::Square;

    #[test]
    fn position_startpos_with_moves() {
        let board = parse_position("position startpos moves e2e4 e7e5 g1f3", false).unwrap();
        assert_eq!(board.turn(), Colour::Black);
        assert_eq!(board.fullmove_number(), 2);
        assert_eq!(
            board.piece_at(Square::F3).map(|p| p.char()),
            Some('N')
        );
    }

    #[test]
    fn position_fen_round_trip() {
        let fen = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";
        let board = parse_position(&format!("position fen {fen}"), false).unwrap();
        assert_eq!(board.to_string(), fen);
    }

    #[test]
    fn illegal_moves_are_skipped_silently() {
        // e9e4 is malformed, e7e5 is illegal for white at that point;
        // both just vanish.
        let board =
            parse_position("position startpos moves e9e4 e2e4 e2e4 d7d5", false).unwrap();
        assert_eq!(board.piece_at(Square::E4).map(|p| p.char()), Some('P'));
        assert_eq!(board.piece_at(Square::D5).map(|p| p.char()), Some('p'));
    }

    #[test]
    fn castling_tokens_accept_both_encodings() {
        let setup = "position fen r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1 moves";
        // conventional king-to-g encoding.
        let board = parse_position(&format!("{setup} e1g1"), false).unwrap();
        assert_eq!(board.piece_at(Square::G1).map(|p| p.char()), Some('K'));
        assert_eq!(board.piece_at(Square::F1).map(|p| p.char()), Some('R'));
        // king-takes-rook encoding is accepted too.
        let board = parse_position(&format!("{setup} e1h1"), false).unwrap();
        assert_eq!(board.piece_at(Square::G1).map(|p| p.char()), Some('K'));
    }

    #[test]
    fn go_clock_terms_follow_the_mover() {
        let board = Board::startpos();
        let limits = parse_go("go wtime 30000 btime 20000 winc 100 binc 200", &board).unwrap();
        assert_eq!(limits.time, Some(30000));
        assert_eq!(limits.inc, 100);
        let limits = parse_go("go depth 12", &board).unwrap();
        assert_eq!(limits.depth, Some(12));
        assert!(!limits.limited_by_self());
        let limits = parse_go("go infinite", &board).unwrap();
        assert!(limits.infinite);
    }

    #[test]
    fn setoption_parsing_and_ranges() {
        assert_eq!(
            parse_setoption("setoption name Hash value 64"),
            Ok(OptionCommand::Hash(64))
        );
        assert_eq!(
            parse_setoption("setoption name MultiPV value 4"),
            Ok(OptionCommand::MultiPv(4))
        );
        assert_eq!(
            parse_setoption("setoption name UCI_Chess960 value true"),
            Ok(OptionCommand::Chess960(true))
        );
        assert!(matches!(
            parse_setoption("setoption name Hash value 0"),
            Err(SetOptionParseError::ValueOutOfRange { .. })
        ));
        assert!(matches!(
            parse_setoption("setoption name Unknown value 1"),
            Err(SetOptionParseError::UnknownOption(_))
        ));
        assert!(matches!(
            parse_setoption("setoption name Hash value banana"),
            Err(SetOptionParseError::InvalidValue { .. })
        ));
    }

    #[test]
    fn score_formatting() {
        assert_eq!(format_score(123).to_string(), "cp 123");
        assert_eq!(format_score(crate::evaluation::mate_in(1)).to_string(), "mate 1");
        assert_eq!(format_score(crate::evaluation::mate_in(4)).to_string(), "mate 2");
        assert_eq!(
            format_score(crate::evaluation::mated_in(3)).to_string(),
            "mate -2"
        );
    }
}

//! Bulls and Cows - Entry Point
//!
//! Runs the room store gateway, a terminal single-player game, or a
//! terminal multiplayer client connected to a gateway.

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bulls_cows::{
    serve, AppError, ChangeEvent, Config, GameController, GuessResult, Mode, RemoteStore,
    RoomStore, SecretCode, SingleGame, StoreServer,
};

#[derive(Parser, Debug)]
#[command(name = "bulls_cows")]
#[command(about = "Crack the 4-digit code, alone or in a room with friends")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the room store gateway
    Serve {
        /// Bind address (overrides BULLS_COWS_ADDR)
        #[arg(long)]
        addr: Option<String>,
    },
    /// Play a single-player game in the terminal
    Solo,
    /// Create a multiplayer room on a gateway
    Create {
        /// Gateway URL
        #[arg(long, default_value = "ws://127.0.0.1:8080")]
        server: String,
        /// Display name
        #[arg(long)]
        name: String,
    },
    /// Join a multiplayer room on a gateway
    Join {
        #[arg(long, default_value = "ws://127.0.0.1:8080")]
        server: String,
        /// 6-digit room code
        #[arg(long)]
        code: String,
        #[arg(long)]
        name: String,
    },
}

type Input = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=bulls_cows=trace
    let default_filter = if cli.verbose {
        "bulls_cows=debug"
    } else {
        "bulls_cows=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let mut config = Config::from_env()?;
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    match cli.command {
        Command::Serve { addr } => {
            if let Some(addr) = addr {
                config.addr = addr;
            }
            let listener = TcpListener::bind(&config.addr).await?;
            info!("Room store gateway listening on {}", config.addr);

            let store = StoreServer::spawn(config.command_buffer);
            serve(listener, store, config.outbound_buffer).await;
        }
        Command::Solo => play_solo(&mut input).await?,
        Command::Create { server, name } => {
            let store = RemoteStore::connect(&server, config.outbound_buffer).await?;
            let mut controller = GameController::new(store);
            if create_until_seated(&mut controller, &mut input, name).await? {
                play_room(&mut controller, &mut input).await?;
            }
        }
        Command::Join { server, code, name } => {
            let store = RemoteStore::connect(&server, config.outbound_buffer).await?;
            let mut controller = GameController::new(store);
            if join_until_seated(&mut controller, &mut input, code, name).await? {
                play_room(&mut controller, &mut input).await?;
            }
        }
    }

    Ok(())
}

/// Print a prompt and read one trimmed line; None on end of input or `/quit`
async fn prompt<R: AsyncBufRead + Unpin>(input: &mut Lines<R>, label: &str) -> Result<Option<String>, AppError> {
    println!("{} (or /quit):", label);
    Ok(input
        .next_line()
        .await?
        .map(|line| line.trim().to_string())
        .filter(|line| line != "/quit"))
}

/// Stay on the create form until a room is made or the user quits
async fn create_until_seated<S: RoomStore, R: AsyncBufRead + Unpin>(
    controller: &mut GameController<S>,
    input: &mut Lines<R>,
    mut name: String,
) -> Result<bool, AppError> {
    controller.open_create_form()?;
    loop {
        match controller.create_room(&name).await {
            Ok(()) => return Ok(true),
            Err(AppError::DuplicateRoomCode(code)) => {
                println!("Room code {} is taken, trying another.", code);
                continue;
            }
            Err(e) => println!("{}", e),
        }
        match prompt(input, "Enter your name to try again").await? {
            Some(line) => name = line,
            None => return Ok(false),
        }
    }
}

/// Stay on the join form until seated in a room or the user quits
async fn join_until_seated<S: RoomStore, R: AsyncBufRead + Unpin>(
    controller: &mut GameController<S>,
    input: &mut Lines<R>,
    mut code: String,
    mut name: String,
) -> Result<bool, AppError> {
    controller.open_join_form()?;
    loop {
        let retry = match controller.join_room(&code, &name).await {
            Ok(()) => return Ok(true),
            Err(AppError::InvalidName) => {
                println!("{}", AppError::InvalidName);
                prompt(input, "Enter your name").await?.map(|line| name = line)
            }
            Err(e) => {
                println!("{}", e);
                prompt(input, "Enter the 6-digit room code").await?.map(|line| code = line)
            }
        };
        if retry.is_none() {
            return Ok(false);
        }
    }
}

/// Single-player loop: guess until cracked, then offer another round
async fn play_solo(input: &mut Input) -> Result<(), AppError> {
    let mut game = SingleGame::new(SecretCode::generate());
    println!("Guess the 4-digit number (digits 1-9, no repeats). Type 'quit' to stop.");

    while let Some(line) = input.next_line().await? {
        let line = line.trim();
        if line == "quit" {
            break;
        }

        if game.has_won() {
            if line == "y" {
                game = SingleGame::new(SecretCode::generate());
                println!("New code ready.");
                continue;
            }
            break;
        }

        match game.submit(line) {
            Ok(result) => {
                print_row(&result);
                if result.is_win() {
                    println!("Code cracked in {} guesses! Play again? (y/n)", result.sequence);
                }
            }
            Err(e) => println!("{}", e),
        }
    }

    Ok(())
}

/// Multiplayer loop: typed commands and room changes, whichever comes first
async fn play_room<S: RoomStore>(
    controller: &mut GameController<S>,
    input: &mut Input,
) -> Result<(), AppError> {
    if let Some(room) = controller.room() {
        println!("Room {} ({}). Share the code to invite friends.", room.code, room.display_name);
    }
    println!("Commands: a 4-digit guess, /players, /watch <n>, /back, /quit");
    print_status(controller);

    loop {
        tokio::select! {
            line = input.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if !handle_command(controller, line.trim()).await {
                    break;
                }
            }
            event = controller.next_event() => {
                let Some(event) = event else {
                    println!("Lost connection to the room.");
                    break;
                };
                announce(controller, &event);
                controller.apply_event(event);
                if controller.mode() != Mode::Multiplayer {
                    println!("You were removed from the room.");
                    return Ok(());
                }
                print_status(controller);
            }
        }
    }

    controller.leave().await;
    Ok(())
}

/// Returns false when the player wants to leave
async fn handle_command<S: RoomStore>(controller: &mut GameController<S>, line: &str) -> bool {
    match line {
        "" => {}
        "/quit" => return false,
        "/players" => {
            for (i, p) in controller.players().iter().enumerate() {
                println!("{}. {} ({} guesses)", i + 1, p.display_name, p.guess_count());
            }
        }
        "/back" => {
            controller.stop_spectating();
            print_history(controller.displayed_history());
        }
        _ if line.starts_with("/watch") => {
            let target = line
                .trim_start_matches("/watch")
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|n| controller.players().get(n.wrapping_sub(1)))
                .map(|p| p.id);
            match target {
                Some(id) => match controller.spectate(id) {
                    Ok(()) => print_history(controller.displayed_history()),
                    Err(e) => println!("{}", e),
                },
                None => println!("Usage: /watch <player number from /players>"),
            }
        }
        guess => match controller.submit_guess(guess).await {
            Ok(result) => print_row(&result),
            Err(e) => println!("{}", e),
        },
    }
    true
}

fn announce<S: RoomStore>(controller: &GameController<S>, event: &ChangeEvent) {
    match event {
        ChangeEvent::PlayerInserted { player } => {
            if controller.players().iter().all(|p| p.id != player.id) {
                println!("{} joined.", player.display_name);
            }
        }
        ChangeEvent::PlayerDeleted { player_id, .. } => {
            if let Some(p) = controller.players().iter().find(|p| p.id == *player_id) {
                println!("{} left.", p.display_name);
            }
        }
        ChangeEvent::PlayerUpdated { .. } | ChangeEvent::RoomUpdated { .. } => {}
    }
}

fn print_status<S: RoomStore>(controller: &GameController<S>) {
    if let Some(room) = controller.room().filter(|r| r.has_winner()) {
        match controller.winner() {
            Some(winner) => println!("{} won! The code was {}.", winner.display_name, room.secret_code),
            None => println!("Game over. The code was {}.", room.secret_code),
        }
    } else if controller.is_my_turn() {
        println!("It's your turn!");
    } else if let Some(p) = controller.current_turn_player() {
        println!("Waiting for {}...", p.display_name);
    }
}

fn print_history(history: &[GuessResult]) {
    if history.is_empty() {
        println!("No guesses yet.");
    }
    for row in history {
        print_row(row);
    }
}

fn print_row(row: &GuessResult) {
    println!(
        "#{:<3} {}  count {}  position {}",
        row.sequence, row.input, row.count_match, row.position_match
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Lines<BufReader<&[u8]>> {
        BufReader::new(text.as_bytes()).lines()
    }

    #[tokio::test]
    async fn test_join_reprompts_until_seated() {
        let store = StoreServer::spawn(16);
        let mut host = GameController::new(store.clone());
        host.open_create_form().unwrap();
        host.create_room("Host").await.unwrap();
        let code = host.room().unwrap().code.to_string();

        let mut guest = GameController::new(store);
        let typed = format!("{}\n", code);
        let mut input = lines(&typed);
        let seated = join_until_seated(&mut guest, &mut input, "999999".to_string(), "Guest".to_string())
            .await
            .unwrap();

        assert!(seated);
        assert_eq!(guest.mode(), Mode::Multiplayer);
        assert_eq!(guest.room().unwrap().code.to_string(), code);
    }

    #[tokio::test]
    async fn test_join_quit_stays_on_form() {
        let mut controller = GameController::new(StoreServer::spawn(16));
        let mut input = lines("/quit\n");
        let seated = join_until_seated(&mut controller, &mut input, "12ab56".to_string(), "Dev".to_string())
            .await
            .unwrap();

        assert!(!seated);
        assert_eq!(controller.mode(), Mode::Join);
    }

    #[tokio::test]
    async fn test_create_reprompts_for_name() {
        let mut controller = GameController::new(StoreServer::spawn(16));
        let mut input = lines("  Asha  \n");
        let seated = create_until_seated(&mut controller, &mut input, "   ".to_string())
            .await
            .unwrap();

        assert!(seated);
        assert_eq!(controller.me().unwrap().display_name, "Asha");
    }
}

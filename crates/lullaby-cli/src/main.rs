//! Lullaby CLI - Terminal now-playing screen

mod cli;
mod input;
mod settings;
mod view;

use std::f64::consts::{ FRAC_PI_2, TAU };
use std::fs;
use std::io;
use std::sync::{ Arc, Mutex };
use std::time::{ Duration, Instant };

use anyhow::Result;
use clap::Parser;
use crossterm::{
    event::{ self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers },
    terminal::{ disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen },
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    symbols::Marker,
    widgets::{ Block, Borders, Clear, LineGauge, Paragraph, Wrap },
    widgets::canvas::{ Canvas, Circle },
};
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing_subscriber::EnvFilter;

use cli::Args;
use input::CommandLine;
use settings::Settings;
use view::{ Control, Overlay, Phase };

use lullaby_core::{
    command, format_time, Command, EngineError, InitOutcome, PlaybackEngineAdapter,
    PlaybackSnapshot, PlaybackStateProjector, ProjectorHandle, SimulatedEngine, TransportController,
};


const ACCENT: Color = Color::Rgb( 0x99, 0x9d, 0xff );
const SLIDER_FILLED: Color = Color::Rgb( 0x34, 0x98, 0xdb );
const SLIDER_EMPTY: Color = Color::Rgb( 0xbd, 0xc3, 0xc7 );
const SPINNER: [&str; 4] = [ "◐", "◓", "◑", "◒" ];
const SLIDER_WIDTH: u16 = 40;


/// Application state.
struct App {
    settings: Settings,
    adapter: PlaybackEngineAdapter,

    // Available once the session is ready
    controller: Option<TransportController>,
    projector: Option<ProjectorHandle>,

    // Screen state
    phase: Phase,
    overlay: Overlay,
    focus: Control,
    command_line: CommandLine,

    /// Decorative dial value (0-100)
    dial: u8,
    frame_count: usize,
    should_quit: bool,

    // Status message (shown in status bar)
    status_message: Option<String>,
    status_clear_at: Option<Instant>,
}


impl App {
    /// Creates the app around a fresh engine.
    fn new( settings: Settings ) -> Self {
        let engine = Arc::new( SimulatedEngine::new() );
        let adapter = PlaybackEngineAdapter::new( engine )
            .with_error_reporting( settings.error_reporting() );

        Self {
            settings,
            adapter,
            controller: None,
            projector: None,
            phase: Phase::Loading,
            overlay: Overlay::None,
            focus: Control::default(),
            command_line: CommandLine::new(),
            dial: 30,
            frame_count: 0,
            should_quit: false,
            status_message: None,
            status_clear_at: None,
        }
    }


    /// Sets a status message that auto-clears after a delay.
    fn set_status( &mut self, msg: impl Into<String> ) {
        self.status_message = Some( msg.into() );
        self.status_clear_at = Some( Instant::now() + Duration::from_secs( 3 ) );
    }


    /// Advances the spinner and clears expired messages.
    fn tick( &mut self ) {
        self.frame_count = self.frame_count.wrapping_add( 1 );

        if let Some( clear_at ) = self.status_clear_at {
            if Instant::now() >= clear_at {
                self.status_message = None;
                self.status_clear_at = None;
            }
        }
    }


    /// Latest projected state, empty while loading.
    fn snapshot( &self ) -> PlaybackSnapshot {
        self.projector
            .as_ref()
            .map( |p| p.snapshot() )
            .unwrap_or_default()
    }


    /// Handles completion of the start-up task.
    async fn on_session_ready( &mut self, result: Result<Result<InitOutcome, EngineError>, JoinError> ) {
        let outcome = match result {
            Ok( Ok( outcome ) ) => outcome,
            Ok( Err( e ) ) => return self.fail_session( e.to_string() ),
            Err( e ) => return self.fail_session( format!( "start-up task failed: {}", e ) ),
        };

        match outcome {
            InitOutcome::Failed( e ) => self.fail_session( e.to_string() ),
            InitOutcome::Ready | InitOutcome::AlreadyReady => self.start_session().await,
        }
    }


    fn fail_session( &mut self, message: String ) {
        tracing::error!( "Session failed to start: {}", message );
        self.phase = Phase::Failed( message );
    }


    async fn start_session( &mut self ) {
        let handle = PlaybackStateProjector::new( self.adapter.clone() )
            .with_poll_interval( self.settings.poll_interval() )
            .start();
        let controller = TransportController::new( self.adapter.clone() )
            .with_projector( Arc::clone( handle.projector() ) );

        self.projector = Some( handle );
        self.controller = Some( controller );
        self.phase = Phase::Ready;
        tracing::info!( "Session ready" );

        if self.settings.autoplay {
            self.run_command( Command::Play ).await;
        }
    }


    /// Handles a key event.
    async fn handle_key( &mut self, key: KeyEvent ) {
        if key.code == KeyCode::Char( 'c' ) && key.modifiers.contains( KeyModifiers::CONTROL ) {
            self.should_quit = true;
            return;
        }

        if self.command_line.is_active() {
            self.handle_command_key( key.code ).await;
            return;
        }

        if self.overlay == Overlay::Help {
            if matches!( key.code, KeyCode::Esc | KeyCode::Char( '?' ) | KeyCode::Char( 'q' ) ) {
                self.overlay = Overlay::None;
            }
            return;
        }

        let cmd = match key.code {
            KeyCode::Char( '/' ) => {
                self.command_line.open();
                return;
            }
            KeyCode::Tab => {
                self.focus = self.focus.next();
                return;
            }
            KeyCode::BackTab => {
                self.focus = self.focus.prev();
                return;
            }
            KeyCode::Char( '[' ) => {
                self.dial = self.dial.saturating_sub( 5 );
                return;
            }
            KeyCode::Char( ']' ) => {
                self.dial = ( self.dial + 5 ).min( 100 );
                return;
            }
            KeyCode::Enter => self.focus.command(),
            KeyCode::Char( ' ' ) => Command::Toggle,
            KeyCode::Char( 'p' ) => Command::Play,
            KeyCode::Left => Command::Prev,
            KeyCode::Right => Command::Next,
            KeyCode::Char( 's' ) => Command::Shuffle,
            KeyCode::Char( 'r' ) => Command::Repeat { mode: None },
            KeyCode::Char( 'e' ) => Command::Explore,
            KeyCode::Char( '?' ) => Command::Help,
            KeyCode::Esc | KeyCode::Char( 'b' ) => Command::Back,
            KeyCode::Char( 'q' ) => Command::Quit,
            _ => return,
        };

        self.run_command( cmd ).await;
    }


    async fn handle_command_key( &mut self, code: KeyCode ) {
        match code {
            KeyCode::Enter => match self.command_line.submit() {
                Ok( cmd ) => self.run_command( cmd ).await,
                Err( e ) => self.set_status( e.to_string() ),
            },
            KeyCode::Esc => self.command_line.close(),
            KeyCode::Backspace => self.command_line.backspace(),
            KeyCode::Left => self.command_line.move_left(),
            KeyCode::Right => self.command_line.move_right(),
            KeyCode::Char( c ) => self.command_line.insert( c ),
            _ => {}
        }
    }


    /// Runs a parsed command against the screen or the player.
    async fn run_command( &mut self, cmd: Command ) {
        match cmd {
            Command::Back => {
                tracing::info!( "Leaving screen" );
                self.should_quit = true;
                return;
            }
            Command::Quit => {
                self.should_quit = true;
                return;
            }
            Command::Help => {
                self.overlay = Overlay::Help;
                return;
            }
            Command::Explore => {
                self.set_status( "Coming Soon..." );
                return;
            }
            _ => {}
        }

        let Some( controller ) = self.controller.as_ref() else {
            self.set_status( "Player is still loading" );
            return;
        };

        let result: Result<Option<String>, EngineError> = match cmd {
            Command::Play => controller.play().await.map( |_| None ),
            Command::Pause => controller.pause().await.map( |_| None ),
            Command::Toggle => controller.toggle_play_pause().await.map( |_| None ),
            Command::Next => controller.next().await.map( |_| None ),
            Command::Prev => controller.previous().await.map( |_| None ),
            Command::Seek { position } => controller.seek( position ).await
                .map( |_| Some( format!( "Seek to {}", format_time( position.as_secs_f64() ) ) ) ),
            Command::Shuffle => controller.shuffle().await
                .map( |n| ( n > 0 ).then( || format!( "Shuffled {} tracks", n ) ) ),
            Command::Repeat { mode: Some( mode ) } => controller.set_repeat( mode ).await
                .map( |_| Some( format!( "Repeat: {}", mode.label() ) ) ),
            Command::Repeat { mode: None } => controller.cycle_repeat().await
                .map( |mode| Some( format!( "Repeat: {}", mode.label() ) ) ),
            Command::Back | Command::Quit | Command::Help | Command::Explore => Ok( None ),
        };

        match result {
            Ok( Some( msg ) ) => self.set_status( msg ),
            Ok( None ) => {}
            Err( e ) => self.set_status( format!( "Player error: {}", e ) ),
        }
    }
}


/// Writes logs to a file; the terminal belongs to the UI.
fn init_logging( filter: &str ) -> Result<()> {
    let Some( path ) = Settings::log_path() else {
        return Ok(());
    };
    if let Some( parent ) = path.parent() {
        fs::create_dir_all( parent )?;
    }
    let file = fs::File::create( &path )?;
    let filter = EnvFilter::try_new( filter ).unwrap_or_else( |_| EnvFilter::new( "info" ) );

    tracing_subscriber::fmt()
        .with_env_filter( filter )
        .with_writer( Mutex::new( file ) )
        .with_ansi( false )
        .init();
    Ok(())
}


/// Reads key presses on a dedicated thread until the receiver is dropped.
fn spawn_key_reader() -> mpsc::UnboundedReceiver<KeyEvent> {
    let ( tx, rx ) = mpsc::unbounded_channel();

    std::thread::spawn( move || {
        while !tx.is_closed() {
            match event::poll( Duration::from_millis( 100 ) ) {
                Ok( true ) => match event::read() {
                    Ok( Event::Key( key ) ) if key.kind == KeyEventKind::Press => {
                        if tx.send( key ).is_err() {
                            break;
                        }
                    }
                    Ok( _ ) => {}
                    Err( e ) => {
                        tracing::error!( "Input error: {}", e );
                        break;
                    }
                },
                Ok( false ) => {}
                Err( e ) => {
                    tracing::error!( "Input error: {}", e );
                    break;
                }
            }
        }
    });

    rx
}


#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Err( e ) = init_logging( &args.log_level ) {
        eprintln!( "Logging disabled: {}", e );
    }
    let settings = Settings::load().merge_args( &args );
    tracing::info!( "Starting with {:?}", settings );

    // Setup terminal
    enable_raw_mode()?;
    io::stdout().execute( EnterAlternateScreen )?;

    let mut terminal = Terminal::new( CrosstermBackend::new( io::stdout() ) )?;

    let mut app = App::new( settings );
    let result = run( &mut terminal, &mut app ).await;

    if let Some( projector ) = app.projector.take() {
        projector.stop().await;
    }

    // Cleanup
    disable_raw_mode()?;
    io::stdout().execute( LeaveAlternateScreen )?;

    result
}


/// Main loop: redraw, then wait for a key, start-up completion, or a tick.
async fn run( terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App ) -> Result<()> {
    let mut keys = spawn_key_reader();

    let adapter = app.adapter.clone();
    let mut session = tokio::spawn( async move { adapter.prepare_session().await } );

    let mut ticker = tokio::time::interval( Duration::from_millis( 100 ) );

    loop {
        terminal.draw( |frame| draw_ui( frame, app ) )?;

        tokio::select! {
            key = keys.recv() => match key {
                Some( key ) => app.handle_key( key ).await,
                None => break,
            },
            result = &mut session, if app.phase == Phase::Loading => {
                app.on_session_ready( result ).await;
            }
            _ = ticker.tick() => app.tick(),
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}


/// Returns a horizontally centered slice of `area`.
fn centered( area: Rect, width: u16 ) -> Rect {
    let width = width.min( area.width );
    Rect {
        x: area.x + ( area.width - width ) / 2,
        width,
        ..area
    }
}


/// Draws the main UI.
fn draw_ui( frame: &mut Frame, app: &App ) {
    let area = frame.area();

    let chunks = Layout::default()
        .direction( Direction::Vertical )
        .constraints([
            Constraint::Length( 3 ),  // Header
            Constraint::Min( 0 ),     // Player
            Constraint::Length( 3 ),  // Explore similar
            Constraint::Length( 1 ),  // Status bar
        ])
        .split( area );

    draw_header( frame, chunks[0] );

    match &app.phase {
        Phase::Loading => draw_loading( frame, app, chunks[1] ),
        Phase::Failed( message ) => draw_failure( frame, message, chunks[1] ),
        Phase::Ready => draw_player( frame, app, chunks[1] ),
    }

    draw_explore( frame, chunks[2] );
    draw_status_bar( frame, app, chunks[3] );

    if app.overlay == Overlay::Help {
        draw_help( frame, area );
    }
}


fn draw_header( frame: &mut Frame, area: Rect ) {
    let style = Style::default().fg( ACCENT ).bold();
    let back = Paragraph::new( " ← Back" ).style( style );
    let menu = Paragraph::new( "≡ " ).style( style ).alignment( Alignment::Right );

    let block = Block::default().borders( Borders::BOTTOM );
    let inner = block.inner( area );
    frame.render_widget( block, area );
    frame.render_widget( back, inner );
    frame.render_widget( menu, inner );
}


fn draw_loading( frame: &mut Frame, app: &App, area: Rect ) {
    let spinner = SPINNER[ app.frame_count % SPINNER.len() ];
    let row = Rect {
        y: area.y + area.height / 2,
        height: 1u16.min( area.height ),
        ..area
    };
    let loading = Paragraph::new( format!( "{} Loading...", spinner ) )
        .style( Style::default().fg( Color::Gray ) )
        .alignment( Alignment::Center );
    frame.render_widget( loading, row );
}


fn draw_failure( frame: &mut Frame, message: &str, area: Rect ) {
    let lines = vec![
        Line::from( Span::styled( "Player could not start", Style::default().fg( Color::Red ).bold() ) ),
        Line::from( Span::styled( message.to_string(), Style::default().fg( Color::Gray ) ) ),
    ];
    let failure = Paragraph::new( lines )
        .alignment( Alignment::Center )
        .wrap( Wrap { trim: true } );
    frame.render_widget( failure, area );
}


fn draw_player( frame: &mut Frame, app: &App, area: Rect ) {
    let snapshot = app.snapshot();

    let rows = Layout::default()
        .direction( Direction::Vertical )
        .constraints([
            Constraint::Min( 5 ),     // Circular slider
            Constraint::Length( 2 ),  // Title and subtitle
            Constraint::Length( 2 ),  // Current track
            Constraint::Length( 1 ),  // Time labels
            Constraint::Length( 1 ),  // Progress slider
            Constraint::Length( 3 ),  // Controls
        ])
        .split( area );

    draw_dial( frame, app.dial, rows[0] );

    let title = Paragraph::new( vec![
        Line::from( Span::styled( "Breathing Practices", Style::default().bold() ) ),
        Line::from( Span::styled( "For relaxation", Style::default().fg( Color::Gray ) ) ),
    ]).alignment( Alignment::Center );
    frame.render_widget( title, rows[1] );

    let track = match snapshot.current_track() {
        Some( track ) => format!( "{} · {}", track.title, track.artist ),
        None => "No track".to_string(),
    };
    let track = Paragraph::new( track )
        .style( Style::default().fg( Color::DarkGray ) )
        .alignment( Alignment::Center );
    frame.render_widget( track, rows[2] );

    let labels = centered( rows[3], SLIDER_WIDTH );
    frame.render_widget( Paragraph::new( snapshot.position_label() ), labels );
    frame.render_widget(
        Paragraph::new( snapshot.duration_label() ).alignment( Alignment::Right ),
        labels,
    );

    let slider = LineGauge::default()
        .ratio( snapshot.slider_fraction() )
        .label( "" )
        .filled_style( Style::default().fg( SLIDER_FILLED ) )
        .unfilled_style( Style::default().fg( SLIDER_EMPTY ) );
    frame.render_widget( slider, centered( rows[4], SLIDER_WIDTH ) );

    draw_controls( frame, app.focus, snapshot.playing, rows[5] );
}


/// Draws the decorative circular slider with its knob at `value` percent.
fn draw_dial( frame: &mut Frame, value: u8, area: Rect ) {
    // Terminal cells are roughly twice as tall as wide
    let area = centered( area, area.height.saturating_mul( 2 ) );
    let angle = FRAC_PI_2 - ( value as f64 / 100.0 ) * TAU;
    let ( knob_x, knob_y ) = ( angle.cos(), angle.sin() );

    let canvas = Canvas::default()
        .marker( Marker::Braille )
        .x_bounds([ -1.2, 1.2 ])
        .y_bounds([ -1.2, 1.2 ])
        .paint( move |ctx| {
            ctx.draw( &Circle { x: 0.0, y: 0.0, radius: 1.0, color: ACCENT } );
            ctx.draw( &Circle { x: knob_x, y: knob_y, radius: 0.08, color: Color::Blue } );
            ctx.print( -0.2, 0.0, Span::styled( format!( "{:>3}%", value ), Style::default().fg( ACCENT ) ) );
        });

    frame.render_widget( canvas, area );
}


fn draw_controls( frame: &mut Frame, focus: Control, playing: bool, area: Rect ) {
    let mut spans = Vec::new();
    for ( i, control ) in Control::ALL.iter().enumerate() {
        if i > 0 {
            spans.push( Span::raw( "    " ) );
        }
        let style = if *control == focus {
            Style::default().fg( ACCENT ).bold().reversed()
        } else {
            Style::default().fg( ACCENT )
        };
        spans.push( Span::styled( format!( " {} ", control.glyph( playing ) ), style ) );
    }

    let controls = Paragraph::new( vec![ Line::default(), Line::from( spans ) ] )
        .alignment( Alignment::Center );
    frame.render_widget( controls, area );
}


fn draw_explore( frame: &mut Frame, area: Rect ) {
    let button = Paragraph::new( Line::from( vec![
        Span::raw( "Explore similar  " ),
        Span::styled( "→", Style::default().fg( SLIDER_FILLED ) ),
    ]))
        .alignment( Alignment::Center )
        .block( Block::default().borders( Borders::ALL ).border_style( Style::default().fg( Color::DarkGray ) ) );
    frame.render_widget( button, centered( area, 30 ) );
}


fn draw_help( frame: &mut Frame, area: Rect ) {
    let width = 50u16.min( area.width );
    let height = 22u16.min( area.height );
    let popup = Rect {
        x: area.x + ( area.width - width ) / 2,
        y: area.y + ( area.height - height ) / 2,
        width,
        height,
    };

    let help = Paragraph::new( command::help_text() )
        .block( Block::default()
            .title( " Help (press ? or Esc to close) " )
            .borders( Borders::ALL )
        );

    frame.render_widget( Clear, popup );
    frame.render_widget( help, popup );
}


fn draw_status_bar( frame: &mut Frame, app: &App, area: Rect ) {
    let ( text, style ) = if app.command_line.is_active() {
        ( format!( "/{}", app.command_line.content() ), Style::default().fg( Color::Yellow ) )
    } else if let Some( ref msg ) = app.status_message {
        ( msg.clone(), Style::default().fg( Color::Green ) )
    } else {
        let hint = match app.phase {
            Phase::Ready => " [Space]Play/Pause [←/→]Skip [s]Shuffle [r]Repeat [Tab]Focus [/]Cmd [?]Help [Esc]Back ",
            Phase::Loading | Phase::Failed( _ ) => " [Esc]Back [q]Quit ",
        };
        ( hint.to_string(), Style::default().fg( Color::DarkGray ) )
    };

    let status = Paragraph::new( text ).style( style );
    frame.render_widget( status, area );

    // Show cursor in command mode
    if app.command_line.is_active() {
        let cursor_x = area.x + 1 + app.command_line.cursor_char_pos() as u16;
        frame.set_cursor_position(( cursor_x, area.y ));
    }
}

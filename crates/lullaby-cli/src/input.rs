//! Slash command line for the TUI.
//!
//! Collects typed text after `/` and parses it into a [`Command`] on
//! submit.

use lullaby_core::{ Command, CommandError };


/// Text entry for slash commands.
#[derive( Debug, Default )]
pub struct CommandLine {
    active: bool,
    content: String,
    /// Byte offset into `content`
    cursor: usize,
}


impl CommandLine {
    pub fn new() -> Self {
        Self::default()
    }


    /// Starts a fresh command.
    pub fn open( &mut self ) {
        self.active = true;
        self.content.clear();
        self.cursor = 0;
    }


    /// Abandons the current command.
    pub fn close( &mut self ) {
        self.active = false;
        self.content.clear();
        self.cursor = 0;
    }


    pub fn is_active( &self ) -> bool {
        self.active
    }


    pub fn insert( &mut self, c: char ) {
        self.content.insert( self.cursor, c );
        self.cursor += c.len_utf8();
    }


    /// Deletes the character before the cursor; closes on an empty line.
    pub fn backspace( &mut self ) {
        if self.content.is_empty() {
            self.close();
            return;
        }
        if let Some(( i, _ )) = self.content[ ..self.cursor ].char_indices().last() {
            self.content.remove( i );
            self.cursor = i;
        }
    }


    pub fn move_left( &mut self ) {
        if let Some(( i, _ )) = self.content[ ..self.cursor ].char_indices().last() {
            self.cursor = i;
        }
    }


    pub fn move_right( &mut self ) {
        if let Some( c ) = self.content[ self.cursor.. ].chars().next() {
            self.cursor += c.len_utf8();
        }
    }


    pub fn content( &self ) -> &str {
        &self.content
    }


    /// Cursor position in characters, for display.
    pub fn cursor_char_pos( &self ) -> usize {
        self.content[ ..self.cursor ].chars().count()
    }


    /// Parses the line and closes it.
    pub fn submit( &mut self ) -> Result<Command, CommandError> {
        let parsed = Command::parse( &self.content );
        self.close();
        parsed
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    fn typed( text: &str ) -> CommandLine {
        let mut line = CommandLine::new();
        line.open();
        text.chars().for_each( |c| line.insert( c ) );
        line
    }


    #[test]
    fn test_submit_parses_and_closes() {
        let mut line = typed( "next" );
        assert_eq!( line.submit(), Ok( Command::Next ) );
        assert!( !line.is_active() );
        assert!( line.content().is_empty() );
    }


    #[test]
    fn test_edit_in_middle() {
        let mut line = typed( "nxt" );
        line.move_left();
        line.move_left();
        line.insert( 'e' );
        assert_eq!( line.content(), "next" );
        assert_eq!( line.cursor_char_pos(), 2 );
    }


    #[test]
    fn test_backspace_on_empty_closes() {
        let mut line = typed( "" );
        line.backspace();
        assert!( !line.is_active() );
    }


    #[test]
    fn test_multibyte_cursor() {
        let mut line = typed( "sé" );
        line.backspace();
        assert_eq!( line.content(), "s" );
        line.move_right();
        assert_eq!( line.cursor_char_pos(), 1 );
    }
}

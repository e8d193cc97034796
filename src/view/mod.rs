// Presentation: column contract, table model, terminal UI
pub mod columns;  // headers, sortability, value formatting
pub mod table;    // sort order + formatted cells, plain/CSV output
pub mod tui;      // ratatui front end

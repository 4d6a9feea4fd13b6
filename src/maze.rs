use std::fmt;
use std::io;
use std::path::Path;

use crate::error::MazeError;

pub type Position = (i32, i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    North,
    South,
    East,
    West,
}

impl Action {
    pub const COUNT: usize = 4;
    pub const ALL: [Action; Action::COUNT] = [Action::North, Action::South, Action::East, Action::West];

    // unit vector, y grows southwards
    pub fn delta(self) -> Position {
        match self {
            Action::North => (0, -1),
            Action::South => (0, 1),
            Action::East => (1, 0),
            Action::West => (-1, 0),
        }
    }

    /// Stable slot of this action in one-hot encodings and in the network output.
    pub fn index(self) -> usize {
        match self {
            Action::North => 0,
            Action::South => 1,
            Action::East => 2,
            Action::West => 3,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::North => "NORTH",
            Action::South => "SOUTH",
            Action::East => "EAST",
            Action::West => "WEST",
        };
        f.write_str(name)
    }
}


// state

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Surrounding {
    Path,
    Wall,
}

/// A coordinate together with what lies in each direction from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct State {
    x: i32,
    y: i32,
    surroundings: [Surrounding; Action::COUNT],
}

impl State {
    pub fn new(x: i32, y: i32, surroundings: [Surrounding; Action::COUNT]) -> Self {
        Self { x, y, surroundings }
    }

    pub fn x(&self) -> i32 {self.x}
    pub fn y(&self) -> i32 {self.y}
    pub fn position(&self) -> Position {(self.x, self.y)}

    pub fn surroundings(&self) -> &[Surrounding; Action::COUNT] {
        &self.surroundings
    }

    pub fn surrounding(&self, action: Action) -> Surrounding {
        self.surroundings[action.index()]
    }

    pub fn is_path(&self, action: Action) -> bool {
        self.surrounding(action) == Surrounding::Path
    }

    pub fn blocked_directions(&self) -> usize {
        self.surroundings.iter().filter(|s| **s == Surrounding::Wall).count()
    }

    pub fn refresh_surroundings(&mut self, maze: &GridMaze) {
        self.surroundings = maze.surroundings_at(self.x, self.y);
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}


// environment

/// What the agent needs to know about the world it moves through.
pub trait Environment {
    fn legal_actions(&self, state: &State) -> Vec<Action>;
    fn is_path(&self, state: &State, action: Action) -> bool;
    /// Whether the agent may stand at `position`.
    fn is_open_cell(&self, position: Position) -> bool;
    /// `None` when the move is blocked.
    fn next_state(&self, state: &State, action: Action) -> Option<State>;
    fn goal_position(&self) -> Position;
    /// (width, height)
    fn dimensions(&self) -> (usize, usize);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    Path,
    Wall,
}

/// Rectangular maze of path and wall cells, indexed `[y][x]`.
#[derive(Debug, Clone, PartialEq)]
pub struct GridMaze {
    cells: Vec<Cell>,
    width: usize,
    height: usize,
    goal: Position,
}

impl GridMaze {
    /// Grid without internal walls.
    pub fn open(width: usize, height: usize, goal: Position) -> Result<Self, MazeError> {
        if width == 0 || height == 0 {
            return Err(MazeError::Empty);
        }
        Self::from_rows(vec![vec![Cell::Path; width]; height], Some(goal))
    }

    /// Builds a maze from rows of cells. Without a goal, the last open cell
    /// scanning from the bottom-right corner is used.
    pub fn from_rows(rows: Vec<Vec<Cell>>, goal: Option<Position>) -> Result<Self, MazeError> {
        let height = rows.len();
        let width = rows.first().map(|row| row.len()).unwrap_or(0);
        if height == 0 || width == 0 {
            return Err(MazeError::Empty);
        }

        let mut cells = Vec::with_capacity(width * height);
        for (row_idx, row) in rows.into_iter().enumerate() {
            if row.len() != width {
                return Err(MazeError::RaggedRow {
                    row: row_idx,
                    expected: width,
                    actual: row.len(),
                });
            }
            cells.extend(row);
        }

        let mut maze = Self {
            cells,
            width,
            height,
            goal: (0, 0),
        };

        let goal = match goal {
            Some(goal) => goal,
            None => maze.last_open_cell().ok_or(MazeError::NoOpenCell)?,
        };
        maze.set_goal(goal)?;

        Ok(maze)
    }

    /// Reads a headerless CSV grid, `0` for path and `1` for wall.
    pub fn from_csv_reader<R: io::Read>(reader: R, goal: Option<Position>) -> Result<Self, MazeError> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::All)
            .from_reader(reader);
        Self::from_csv_records(reader, goal)
    }

    pub fn from_csv_path<P: AsRef<Path>>(path: P, goal: Option<Position>) -> Result<Self, MazeError> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::All)
            .from_path(path)?;
        Self::from_csv_records(reader, goal)
    }

    fn from_csv_records<R: io::Read>(mut reader: csv::Reader<R>, goal: Option<Position>) -> Result<Self, MazeError> {
        let mut rows = Vec::new();
        for (row_idx, result) in reader.records().enumerate() {
            let record = result?;
            let row = record
                .iter()
                .enumerate()
                .map(|(column, value)| match value {
                    "0" => Ok(Cell::Path),
                    "1" => Ok(Cell::Wall),
                    other => Err(MazeError::InvalidCell {
                        row: row_idx,
                        column,
                        value: other.to_string(),
                    }),
                })
                .collect::<Result<Vec<Cell>, MazeError>>()?;
            rows.push(row);
        }

        Self::from_rows(rows, goal)
    }

    pub fn width(&self) -> usize {self.width}
    pub fn height(&self) -> usize {self.height}

    pub fn set_goal(&mut self, goal: Position) -> Result<(), MazeError> {
        if !self.is_open(goal.0, goal.1) {
            return Err(MazeError::GoalNotOpen { x: goal.0, y: goal.1 });
        }
        self.goal = goal;
        Ok(())
    }

    pub fn cell(&self, x: i32, y: i32) -> Option<Cell> {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return None;
        }
        Some(self.cells[y as usize * self.width + x as usize])
    }

    // out of bounds counts as wall
    pub fn is_open(&self, x: i32, y: i32) -> bool {
        self.cell(x, y) == Some(Cell::Path)
    }

    pub fn surroundings_at(&self, x: i32, y: i32) -> [Surrounding; Action::COUNT] {
        Action::ALL.map(|action| {
            let (dx, dy) = action.delta();
            if self.is_open(x + dx, y + dy) {
                Surrounding::Path
            } else {
                Surrounding::Wall
            }
        })
    }

    /// State at an open cell, `None` for walls and out-of-bounds coordinates.
    pub fn state_at(&self, x: i32, y: i32) -> Option<State> {
        if !self.is_open(x, y) {
            return None;
        }
        Some(State::new(x, y, self.surroundings_at(x, y)))
    }

    pub fn last_open_cell(&self) -> Option<Position> {
        (0..self.cells.len())
            .rev()
            .find(|&idx| self.cells[idx] == Cell::Path)
            .map(|idx| ((idx % self.width) as i32, (idx / self.width) as i32))
    }
}

impl Environment for GridMaze {
    fn legal_actions(&self, state: &State) -> Vec<Action> {
        Action::ALL
            .into_iter()
            .filter(|&action| self.is_path(state, action))
            .collect()
    }

    fn is_path(&self, state: &State, action: Action) -> bool {
        let (dx, dy) = action.delta();
        self.is_open(state.x() + dx, state.y() + dy)
    }

    fn is_open_cell(&self, (x, y): Position) -> bool {
        self.is_open(x, y)
    }

    fn next_state(&self, state: &State, action: Action) -> Option<State> {
        if !self.is_path(state, action) {
            return None;
        }
        let (dx, dy) = action.delta();
        self.state_at(state.x() + dx, state.y() + dy)
    }

    fn goal_position(&self) -> Position {
        self.goal
    }

    fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }
}

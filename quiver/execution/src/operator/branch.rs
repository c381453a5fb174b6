use quiver_planner::SymbolId;

use super::{BoxedOperator, PhysicalOperator};
use crate::context::ExecutionContext;
use crate::error::ExecutionResult;
use crate::frame::Frame;
use crate::value::Value;

/// MERGE: per input row, stream the match branch; when it produces
/// nothing, run the create branch instead.
pub struct Merge {
    input: BoxedOperator,
    on_match: BoxedOperator,
    on_create: BoxedOperator,
    state: MergeState,
}

#[derive(Clone, Copy)]
enum MergeState {
    PullInput,
    Matching { matched: bool },
    Creating,
}

impl Merge {
    pub fn new(input: BoxedOperator, on_match: BoxedOperator, on_create: BoxedOperator) -> Self {
        Self {
            input,
            on_match,
            on_create,
            state: MergeState::PullInput,
        }
    }
}

impl PhysicalOperator for Merge {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> ExecutionResult<bool> {
        loop {
            match self.state {
                MergeState::PullInput => {
                    if !self.input.pull(frame, ctx)? {
                        return Ok(false);
                    }
                    self.on_match.reset();
                    self.state = MergeState::Matching { matched: false };
                }
                MergeState::Matching { matched } => {
                    if self.on_match.pull(frame, ctx)? {
                        self.state = MergeState::Matching { matched: true };
                        return Ok(true);
                    }
                    if matched {
                        self.state = MergeState::PullInput;
                    } else {
                        self.on_create.reset();
                        self.state = MergeState::Creating;
                    }
                }
                MergeState::Creating => {
                    if self.on_create.pull(frame, ctx)? {
                        return Ok(true);
                    }
                    self.state = MergeState::PullInput;
                }
            }
        }
    }

    fn reset(&mut self) {
        self.input.reset();
        self.on_match.reset();
        self.on_create.reset();
        self.state = MergeState::PullInput;
    }
}

/// OPTIONAL MATCH: stream the branch; when it produces nothing for an
/// input row, emit the row once with the branch's symbols nulled.
pub struct Optional {
    input: BoxedOperator,
    branch: BoxedOperator,
    optional_symbols: Vec<SymbolId>,
    state: OptionalState,
}

#[derive(Clone, Copy)]
enum OptionalState {
    PullInput,
    Streaming { yielded: bool },
}

impl Optional {
    pub fn new(input: BoxedOperator, branch: BoxedOperator, optional_symbols: Vec<SymbolId>) -> Self {
        Self {
            input,
            branch,
            optional_symbols,
            state: OptionalState::PullInput,
        }
    }
}

impl PhysicalOperator for Optional {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> ExecutionResult<bool> {
        loop {
            match self.state {
                OptionalState::PullInput => {
                    if !self.input.pull(frame, ctx)? {
                        return Ok(false);
                    }
                    self.branch.reset();
                    self.state = OptionalState::Streaming { yielded: false };
                }
                OptionalState::Streaming { yielded } => {
                    if self.branch.pull(frame, ctx)? {
                        self.state = OptionalState::Streaming { yielded: true };
                        return Ok(true);
                    }
                    self.state = OptionalState::PullInput;
                    if !yielded {
                        for symbol in &self.optional_symbols {
                            frame.set(*symbol, Value::NULL);
                        }
                        return Ok(true);
                    }
                }
            }
        }
    }

    fn reset(&mut self) {
        self.input.reset();
        self.branch.reset();
        self.state = OptionalState::PullInput;
    }
}

/// Materializes its whole input before emitting anything, so writes below
/// it finish before reads above it start.
pub struct Accumulate {
    input: BoxedOperator,
    symbols: Vec<SymbolId>,
    rows: Option<Vec<Vec<Value>>>,
    next: usize,
}

impl Accumulate {
    pub fn new(input: BoxedOperator, symbols: Vec<SymbolId>) -> Self {
        Self {
            input,
            symbols,
            rows: None,
            next: 0,
        }
    }
}

impl PhysicalOperator for Accumulate {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> ExecutionResult<bool> {
        if self.rows.is_none() {
            let mut rows = Vec::new();
            while self.input.pull(frame, ctx)? {
                rows.push(frame.save(&self.symbols));
            }
            self.rows = Some(rows);
            self.next = 0;
        }
        let rows = self.rows.as_ref().expect("materialized above");
        if self.next >= rows.len() {
            return Ok(false);
        }
        frame.restore(&self.symbols, &rows[self.next]);
        self.next += 1;
        Ok(true)
    }

    fn reset(&mut self) {
        self.input.reset();
        self.rows = None;
        self.next = 0;
    }
}

/// Cross product of two disconnected subplans. The left side is
/// materialized once; the right side streams, and for every right row all
/// left rows are replayed.
pub struct Cartesian {
    left: BoxedOperator,
    right: BoxedOperator,
    left_symbols: Vec<SymbolId>,
    left_rows: Option<Vec<Vec<Value>>>,
    left_next: usize,
    right_active: bool,
}

impl Cartesian {
    pub fn new(left: BoxedOperator, right: BoxedOperator, left_symbols: Vec<SymbolId>) -> Self {
        Self {
            left,
            right,
            left_symbols,
            left_rows: None,
            left_next: 0,
            right_active: false,
        }
    }
}

impl PhysicalOperator for Cartesian {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> ExecutionResult<bool> {
        if self.left_rows.is_none() {
            let mut rows = Vec::new();
            while self.left.pull(frame, ctx)? {
                rows.push(frame.save(&self.left_symbols));
            }
            self.left_rows = Some(rows);
        }
        let left_rows = self.left_rows.as_ref().expect("materialized above");
        if left_rows.is_empty() {
            return Ok(false);
        }
        loop {
            if self.right_active && self.left_next < left_rows.len() {
                frame.restore(&self.left_symbols, &left_rows[self.left_next]);
                self.left_next += 1;
                return Ok(true);
            }
            self.right_active = false;
            if !self.right.pull(frame, ctx)? {
                return Ok(false);
            }
            self.left_next = 0;
            self.right_active = true;
        }
    }

    fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
        self.left_rows = None;
        self.left_next = 0;
        self.right_active = false;
    }
}

/// UNION: left rows, then right rows with the right arm's output slots
/// copied into the left arm's.
pub struct Union {
    left: BoxedOperator,
    right: BoxedOperator,
    left_symbols: Vec<SymbolId>,
    right_symbols: Vec<SymbolId>,
    left_done: bool,
}

impl Union {
    pub fn new(
        left: BoxedOperator,
        right: BoxedOperator,
        left_symbols: Vec<SymbolId>,
        right_symbols: Vec<SymbolId>,
    ) -> Self {
        Self {
            left,
            right,
            left_symbols,
            right_symbols,
            left_done: false,
        }
    }
}

impl PhysicalOperator for Union {
    fn pull(&mut self, frame: &mut Frame, ctx: &mut ExecutionContext) -> ExecutionResult<bool> {
        if !self.left_done {
            if self.left.pull(frame, ctx)? {
                return Ok(true);
            }
            self.left_done = true;
        }
        if !self.right.pull(frame, ctx)? {
            return Ok(false);
        }
        let values = frame.save(&self.right_symbols);
        frame.restore(&self.left_symbols, &values);
        Ok(true)
    }

    fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
        self.left_done = false;
    }
}

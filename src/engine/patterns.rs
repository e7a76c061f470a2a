//! Pattern Signals
//!
//! Higher-level chart patterns built from breakouts and per-column extremes.
//! Each column holds at most one signal; detectors run from the most specific
//! pattern to the simplest and never overwrite a claimed column:
//!
//! triangles, poles, long tail down, traps, ascending/descending triples,
//! catapults, reversed signals, spread triples, triples, quadruples, doubles,
//! simple buy/sell.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::breakouts::Breakout;
use super::matrix::PnfMatrix;
use crate::config::SignalParams;
use crate::types::Trend;

/// Minimum height of the falling column in a long tail down reversal
pub const LONG_TAIL_HEIGHT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    BuySignal,
    SellSignal,
    DoubleTopBreakout,
    DoubleBottomBreakdown,
    TripleTopBreakout,
    TripleBottomBreakdown,
    QuadrupleTopBreakout,
    QuadrupleBottomBreakdown,
    AscendingTripleTopBreakout,
    DescendingTripleBottomBreakdown,
    BullishCatapultBreakout,
    BearishCatapultBreakdown,
    BullishSignalReversed,
    BearishSignalReversed,
    BullishTriangleBreakout,
    BearishTriangleBreakdown,
    LongTailDownReversal,
    BullTrap,
    BearTrap,
    SpreadTripleTopBreakout,
    SpreadTripleBottomBreakdown,
    HighPole,
    LowPole,
}

impl SignalKind {
    pub fn label(self) -> &'static str {
        match self {
            SignalKind::BuySignal => "Buy Signal",
            SignalKind::SellSignal => "Sell Signal",
            SignalKind::DoubleTopBreakout => "Double Top Breakout",
            SignalKind::DoubleBottomBreakdown => "Double Bottom Breakdown",
            SignalKind::TripleTopBreakout => "Triple Top Breakout",
            SignalKind::TripleBottomBreakdown => "Triple Bottom Breakdown",
            SignalKind::QuadrupleTopBreakout => "Quadruple Top Breakout",
            SignalKind::QuadrupleBottomBreakdown => "Quadruple Bottom Breakdown",
            SignalKind::AscendingTripleTopBreakout => "Ascending Triple Top Breakout",
            SignalKind::DescendingTripleBottomBreakdown => "Descending Triple Bottom Breakdown",
            SignalKind::BullishCatapultBreakout => "Bullish Catapult Breakout",
            SignalKind::BearishCatapultBreakdown => "Bearish Catapult Breakdown",
            SignalKind::BullishSignalReversed => "Bullish Signal Reversed",
            SignalKind::BearishSignalReversed => "Bearish Signal Reversed",
            SignalKind::BullishTriangleBreakout => "Bullish Triangle Breakout",
            SignalKind::BearishTriangleBreakdown => "Bearish Triangle Breakdown",
            SignalKind::LongTailDownReversal => "Long Tail Down Reversal",
            SignalKind::BullTrap => "Bull Trap",
            SignalKind::BearTrap => "Bear Trap",
            SignalKind::SpreadTripleTopBreakout => "Spread Triple Top Breakout",
            SignalKind::SpreadTripleBottomBreakdown => "Spread Triple Bottom Breakdown",
            SignalKind::HighPole => "High Pole",
            SignalKind::LowPole => "Low Pole",
        }
    }

    /// Direction the signal points to
    pub fn trend(self) -> Trend {
        match self {
            SignalKind::BuySignal
            | SignalKind::DoubleTopBreakout
            | SignalKind::TripleTopBreakout
            | SignalKind::QuadrupleTopBreakout
            | SignalKind::AscendingTripleTopBreakout
            | SignalKind::BullishCatapultBreakout
            | SignalKind::BullishSignalReversed
            | SignalKind::BullishTriangleBreakout
            | SignalKind::LongTailDownReversal
            | SignalKind::BearTrap
            | SignalKind::SpreadTripleTopBreakout
            | SignalKind::LowPole => Trend::Bullish,
            _ => Trend::Bearish,
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub column: usize,
    /// Row of the signalling box
    pub row: usize,
    pub top_row: usize,
    pub bottom_row: usize,
    /// Columns spanned by the pattern
    pub width: usize,
    /// Bar that filled the signalling box
    pub bar: Option<usize>,
}

/// One signal slot per column, first claim wins
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalBoard {
    slots: Vec<Option<Signal>>,
}

impl SignalBoard {
    pub fn new(columns: usize) -> Self {
        Self {
            slots: vec![None; columns],
        }
    }

    /// Register `signal` unless its column is taken; returns whether it was stored
    pub fn claim(&mut self, signal: Signal) -> bool {
        match self.slots.get_mut(signal.column) {
            Some(slot) if slot.is_none() => {
                *slot = Some(signal);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, column: usize) -> Option<&Signal> {
        self.slots.get(column).and_then(Option::as_ref)
    }

    /// Claimed signals, left to right
    pub fn into_signals(self) -> Vec<Signal> {
        self.slots.into_iter().flatten().collect()
    }
}

/// Detectors over one matrix and its breakouts
pub struct PatternRecognizer<'a> {
    matrix: &'a PnfMatrix,
    breakouts: &'a [Breakout],
    reversal: usize,
    highs: Vec<usize>,
    lows: Vec<usize>,
    heights: Vec<usize>,
    trends: Vec<Option<Trend>>,
}

impl<'a> PatternRecognizer<'a> {
    pub fn new(matrix: &'a PnfMatrix, breakouts: &'a [Breakout], reversal: u32) -> Self {
        let columns = matrix.columns();
        let mut highs = vec![0; columns];
        let mut lows = vec![0; columns];
        let mut heights = vec![0; columns];
        let mut trends = vec![None; columns];
        for profile in matrix.profiles() {
            highs[profile.column] = profile.high;
            lows[profile.column] = profile.low;
            heights[profile.column] = profile.high - profile.low + 1;
            trends[profile.column] = Some(profile.trend);
        }

        Self {
            matrix,
            breakouts,
            reversal: reversal as usize,
            highs,
            lows,
            heights,
            trends,
        }
    }

    pub fn board(&self) -> SignalBoard {
        SignalBoard::new(self.matrix.columns())
    }

    fn signal(&self, kind: SignalKind, column: usize, row: usize, top_row: usize, bottom_row: usize, width: usize) -> Signal {
        Signal {
            kind,
            column,
            row,
            top_row,
            bottom_row,
            width,
            bar: self.matrix.action(row, column),
        }
    }

    /// Highest column high over `from..to`
    fn top_of(&self, from: usize, to: usize) -> usize {
        self.highs[from.min(to)..to].iter().copied().max().unwrap_or(0)
    }

    /// Lowest column low over `from..to`
    fn bottom_of(&self, from: usize, to: usize) -> usize {
        self.lows[from.min(to)..to].iter().copied().min().unwrap_or(0)
    }

    fn is_shape(b: &Breakout, hits: usize, width: usize) -> bool {
        b.hits == hits && b.width == width
    }

    fn has_breakout(&self, column: usize, trend: Trend, hits: usize, width: usize) -> bool {
        self.breakouts
            .iter()
            .any(|b| b.column == column && b.trend == trend && Self::is_shape(b, hits, width))
    }

    /// Converging columns ending in a 3-wide breakout
    pub fn triangles(&self, board: &mut SignalBoard, strict: bool) {
        let within = |value: usize, target: usize| {
            if strict {
                value == target
            } else {
                value + 1 >= target && value <= target + 1
            }
        };

        for b in self.breakouts.iter().filter(|b| b.width == 3) {
            if b.column < 2 {
                continue;
            }
            let mut i = b.column - 1;
            let mut height = self.heights[i] + 2;
            let mut high = self.highs[i] + 1;
            i -= 1;
            let mut hits = 1;

            while within(self.heights[i], height) && within(self.highs[i], high) && i > 0 {
                height = self.heights[i] + 2;
                high = self.highs[i] + 1;
                hits += 1;
                i -= 1;
            }

            if hits > 3 {
                let kind = match b.trend {
                    Trend::Bullish => SignalKind::BullishTriangleBreakout,
                    Trend::Bearish => SignalKind::BearishTriangleBreakdown,
                };
                let from = b.column.saturating_sub(hits);
                board.claim(self.signal(
                    kind,
                    b.column,
                    b.row,
                    self.top_of(from, b.column),
                    self.bottom_of(from, b.column),
                    hits,
                ));
            }
        }
    }

    /// A column reaching 3+ boxes past the extreme two columns back, then retraced by half
    pub fn poles(&self, board: &mut SignalBoard) {
        let columns = self.matrix.columns();
        for n in 2..columns.saturating_sub(1) {
            let retraced = 2 * self.heights[n + 1] >= self.heights[n];
            if !retraced {
                continue;
            }
            match self.trends[n] {
                Some(Trend::Bullish) if self.highs[n] >= self.highs[n - 2] + 3 => {
                    board.claim(self.signal(
                        SignalKind::HighPole,
                        n + 1,
                        self.lows[n + 1],
                        self.highs[n],
                        self.lows[n - 1],
                        3,
                    ));
                }
                Some(Trend::Bearish) if self.lows[n] + 3 <= self.lows[n - 2] => {
                    board.claim(self.signal(
                        SignalKind::LowPole,
                        n + 1,
                        self.highs[n + 1],
                        self.highs[n - 1],
                        self.lows[n],
                        3,
                    ));
                }
                _ => {}
            }
        }
    }

    /// A long falling column answered by a reversal column
    pub fn long_tail_down(&self, board: &mut SignalBoard) {
        let columns = self.matrix.columns();
        for n in 0..columns.saturating_sub(1) {
            if self.trends[n] == Some(Trend::Bearish)
                && self.heights[n] >= LONG_TAIL_HEIGHT
                && self.trends[n + 1] == Some(Trend::Bullish)
            {
                board.claim(self.signal(
                    SignalKind::LongTailDownReversal,
                    n + 1,
                    self.highs[n + 1],
                    self.highs[n],
                    self.lows[n],
                    2,
                ));
            }
        }
    }

    /// One-box triple breakouts that reverse in the next column
    pub fn traps(&self, board: &mut SignalBoard) {
        let columns = self.matrix.columns();
        for b in self.breakouts.iter().filter(|b| Self::is_shape(b, 3, 5)) {
            let (current, next) = (b.column, b.column + 1);
            if current < 2 || next >= columns || self.heights[next] < self.reversal {
                continue;
            }
            let previous = current - 2;
            let from = current.saturating_sub(4);

            let (kind, row) = match b.trend {
                Trend::Bullish if self.highs[current] == self.highs[previous] + 1 => (SignalKind::BullTrap, self.lows[next]),
                Trend::Bearish if self.lows[current] + 1 == self.lows[previous] => (SignalKind::BearTrap, self.highs[next]),
                _ => continue,
            };
            board.claim(self.signal(kind, next, row, self.top_of(from, next), self.bottom_of(from, next), 6));
        }
    }

    /// Double breakouts two columns apart in the same direction
    pub fn ascending_descending_triples(&self, board: &mut SignalBoard) {
        for b in self.breakouts.iter().filter(|b| Self::is_shape(b, 2, 3)) {
            if b.column < 2 || !self.has_breakout(b.column - 2, b.trend, 2, 3) {
                continue;
            }
            let kind = match b.trend {
                Trend::Bullish => SignalKind::AscendingTripleTopBreakout,
                Trend::Bearish => SignalKind::DescendingTripleBottomBreakdown,
            };
            let from = b.column.saturating_sub(4);
            board.claim(self.signal(
                kind,
                b.column,
                b.row,
                self.top_of(from, b.column),
                self.bottom_of(from, b.column),
                5,
            ));
        }
    }

    /// A triple breakout followed two columns later by a double in the same direction
    pub fn catapults(&self, board: &mut SignalBoard) {
        for b in self.breakouts.iter().filter(|b| Self::is_shape(b, 2, 3)) {
            if b.column < 2 || !self.has_breakout(b.column - 2, b.trend, 3, 5) {
                continue;
            }
            let kind = match b.trend {
                Trend::Bullish => SignalKind::BullishCatapultBreakout,
                Trend::Bearish => SignalKind::BearishCatapultBreakdown,
            };
            let from = b.column.saturating_sub(6);
            board.claim(self.signal(
                kind,
                b.column,
                b.row,
                self.top_of(from, b.column),
                self.bottom_of(from, b.column),
                7,
            ));
        }
    }

    /// A double breakout against a series of columns stepping one box at a time
    pub fn reversed_signals(&self, board: &mut SignalBoard) {
        for b in self.breakouts.iter().filter(|b| Self::is_shape(b, 2, 3)) {
            if b.column < 1 {
                continue;
            }
            let mut i = b.column - 1;
            let mut count = 1;

            let steps = |i: usize| match b.trend {
                Trend::Bullish => {
                    self.lows[i] + 1 == self.lows[i - 2] && self.highs[i - 1] + 1 == self.highs[i - 3]
                }
                Trend::Bearish => {
                    self.highs[i] == self.highs[i - 2] + 1 && self.lows[i - 1] == self.lows[i - 3] + 1
                }
            };
            while i >= 3 && steps(i) {
                i -= 2;
                count += 2;
            }
            if count < 3 {
                continue;
            }

            let start = i.saturating_sub(2);
            let (kind, top, bottom) = match b.trend {
                Trend::Bullish => (SignalKind::BullishSignalReversed, self.highs[b.column], self.lows[start]),
                Trend::Bearish => (SignalKind::BearishSignalReversed, self.highs[start], self.lows[b.column]),
            };
            board.claim(self.signal(kind, b.column, b.row, top, bottom, b.column - i + 1));
        }
    }

    /// Breakouts of a given shape, bounded by the columns of the pattern
    fn multiple(&self, board: &mut SignalBoard, shapes: &[(usize, usize)], inclusive: bool, kinds: (SignalKind, SignalKind)) {
        for b in self.breakouts.iter() {
            if !shapes.iter().any(|&(hits, width)| Self::is_shape(b, hits, width)) {
                continue;
            }
            let span = if inclusive { b.width - 1 } else { b.width };
            let from = b.column.saturating_sub(span);
            let (kind, top, bottom) = match b.trend {
                Trend::Bullish => (kinds.0, self.highs[b.column], self.bottom_of(from, b.column)),
                Trend::Bearish => (kinds.1, self.top_of(from, b.column), self.lows[b.column]),
            };
            board.claim(self.signal(kind, b.column, b.row, top, bottom, b.width));
        }
    }

    pub fn spread_triples(&self, board: &mut SignalBoard) {
        self.multiple(
            board,
            &[(3, 7), (3, 9)],
            true,
            (SignalKind::SpreadTripleTopBreakout, SignalKind::SpreadTripleBottomBreakdown),
        );
    }

    pub fn triples(&self, board: &mut SignalBoard) {
        self.multiple(
            board,
            &[(3, 5)],
            false,
            (SignalKind::TripleTopBreakout, SignalKind::TripleBottomBreakdown),
        );
    }

    pub fn quadruples(&self, board: &mut SignalBoard) {
        self.multiple(
            board,
            &[(4, 7)],
            false,
            (SignalKind::QuadrupleTopBreakout, SignalKind::QuadrupleBottomBreakdown),
        );
    }

    pub fn doubles(&self, board: &mut SignalBoard) {
        self.multiple(
            board,
            &[(2, 3)],
            false,
            (SignalKind::DoubleTopBreakout, SignalKind::DoubleBottomBreakdown),
        );
    }

    /// Column extreme beyond the same-direction column two back
    pub fn simple_signals(&self, board: &mut SignalBoard) {
        for n in 2..self.matrix.columns() {
            match self.trends[n] {
                Some(Trend::Bullish) if self.highs[n] > self.highs[n - 2] => {
                    board.claim(self.signal(SignalKind::BuySignal, n, self.highs[n], self.highs[n], self.lows[n - 1], 3));
                }
                Some(Trend::Bearish) if self.lows[n] < self.lows[n - 2] => {
                    board.claim(self.signal(SignalKind::SellSignal, n, self.lows[n], self.highs[n - 1], self.lows[n], 3));
                }
                _ => {}
            }
        }
    }

    /// Every detector in priority order
    pub fn recognize(&self, params: SignalParams) -> Vec<Signal> {
        let mut board = self.board();
        self.triangles(&mut board, params.strict);
        self.poles(&mut board);
        self.long_tail_down(&mut board);
        self.traps(&mut board);
        self.ascending_descending_triples(&mut board);
        self.catapults(&mut board);
        self.reversed_signals(&mut board);
        self.spread_triples(&mut board);
        self.triples(&mut board);
        self.quadruples(&mut board);
        self.doubles(&mut board);
        self.simple_signals(&mut board);

        let signals = board.into_signals();
        debug!("Recognized {} signals", signals.len());
        signals
    }
}

/// Signals of the matrix, at most one per column
pub fn detect_signals(matrix: &PnfMatrix, breakouts: &[Breakout], reversal: u32, params: SignalParams) -> Vec<Signal> {
    PatternRecognizer::new(matrix, breakouts, reversal).recognize(params)
}

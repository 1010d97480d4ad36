//! Player-facing notifications.

use std::collections::VecDeque;

use crate::fixed::Ticks;

/// Items kept before the oldest is dropped.
pub const DEFAULT_NEWS_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewsKind {
    General,
    Replay,
    Desync,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsItem {
    pub tick: Ticks,
    pub kind: NewsKind,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct NewsFeed {
    items: VecDeque<NewsItem>,
    capacity: usize,
}

impl Default for NewsFeed {
    fn default() -> Self {
        Self::new(DEFAULT_NEWS_CAPACITY)
    }
}

impl NewsFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn post(&mut self, tick: Ticks, kind: NewsKind, text: impl Into<String>) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(NewsItem {
            tick,
            kind,
            text: text.into(),
        });
    }

    /// Oldest first.
    pub fn items(&self) -> impl Iterator<Item = &NewsItem> {
        self.items.iter()
    }

    pub fn latest(&self) -> Option<&NewsItem> {
        self.items.back()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

//! LIFO stacks of unmatched notes.
//!
//! Every track keeps one stack per (pitch, channel) pair, 4096 in total. The stacks are singly
//! linked lists whose nodes live in one shared [`StackArena`]; released nodes go on an intrusive
//! free list so pushes after pops never allocate, and no stack is ever resized.

/// Pitch values a track can address, data bytes are not masked
pub const PITCHES: usize = 256;
/// MIDI channels
pub const CHANNELS: usize = 16;

/// A node slot, holding an item while it is linked into a stack
#[derive(Debug, Clone)]
struct Node<T> {
    /// The stored item, `None` while the node sits on the free list
    item: Option<T>,
    /// Next node in the owning stack or in the free list
    next: Option<usize>,
}

/// Node storage shared by many stacks
#[derive(Debug, Clone)]
pub struct StackArena<T> {
    /// Every node ever allocated
    nodes: Vec<Node<T>>,
    /// Head of the free list
    free: Option<usize>,
    /// Nodes currently linked into some stack
    live: usize,
}

impl<T> Default for StackArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> StackArena<T> {
    /// Creates an empty arena
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an arena with room for `capacity` nodes before it reallocates
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            free: None,
            live: 0,
        }
    }

    /// Number of items stored across all stacks
    pub fn live(&self) -> usize {
        self.live
    }

    /// Stores `item` in a node linked in front of `next`, recycling a free node when possible
    fn alloc(&mut self, item: T, next: Option<usize>) -> usize {
        self.live += 1;

        match self.free {
            Some(index) => {
                let node = &mut self.nodes[index];
                self.free = node.next;
                node.item = Some(item);
                node.next = next;
                index
            }
            None => {
                self.nodes.push(Node {
                    item: Some(item),
                    next,
                });
                self.nodes.len() - 1
            }
        }
    }

    /// Unlinks the item out of a node and puts the node on the free list
    fn release(&mut self, index: usize) -> Option<T> {
        let node = &mut self.nodes[index];
        let item = node.item.take()?;
        node.next = self.free;
        self.free = Some(index);
        self.live -= 1;
        Some(item)
    }

    /// Successor of a linked node
    fn next_of(&self, index: usize) -> Option<usize> {
        self.nodes[index].next
    }

    /// Item of a linked node
    fn item(&self, index: usize) -> Option<&T> {
        self.nodes[index].item.as_ref()
    }
}

/// A LIFO stack whose nodes live in a [`StackArena`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoteStack {
    /// Most recently pushed node
    head: Option<usize>,
    /// Number of linked items
    len: usize,
}

impl NoteStack {
    /// Creates an empty stack
    pub const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    /// Number of items on the stack
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns if the stack holds nothing
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Pushes an item on top, O(1)
    pub fn push<T>(&mut self, arena: &mut StackArena<T>, item: T) {
        self.head = Some(arena.alloc(item, self.head));
        self.len += 1;
    }

    /// Pops the most recently pushed item, O(1)
    pub fn pop<T>(&mut self, arena: &mut StackArena<T>) -> Option<T> {
        let head = self.head?;
        self.head = arena.next_of(head);
        self.len -= 1;
        arena.release(head)
    }

    /// The item that the next pop would return
    pub fn peek<'a, T>(&self, arena: &'a StackArena<T>) -> Option<&'a T> {
        arena.item(self.head?)
    }

    /// Walks the stack from the top without modifying it
    pub fn iter<'a, T>(&self, arena: &'a StackArena<T>) -> impl Iterator<Item = &'a T> + 'a {
        let mut next = self.head;
        std::iter::from_fn(move || {
            let index = next?;
            next = arena.next_of(index);
            arena.item(index)
        })
    }

    /// A cursor from the top of the stack that can unlink items as it goes
    pub fn cursor<'a, T>(&'a mut self, arena: &'a mut StackArena<T>) -> StackCursor<'a, T> {
        let upcoming = self.head;
        StackCursor {
            stack: self,
            arena,
            prev: None,
            current: None,
            upcoming,
        }
    }
}

/// Cursor over a [`NoteStack`] supporting removal of the element it points at
#[derive(Debug)]
pub struct StackCursor<'a, T> {
    /// The stack being walked
    stack: &'a mut NoteStack,
    /// Node storage of the stack
    arena: &'a mut StackArena<T>,
    /// Last node before `current` that is still linked
    prev: Option<usize>,
    /// Node returned by the last `advance`, `None` once removed
    current: Option<usize>,
    /// Node the next `advance` will move to
    upcoming: Option<usize>,
}

impl<T> StackCursor<'_, T> {
    /// Moves to the next item, top of the stack first
    pub fn advance(&mut self) -> Option<&T> {
        if let Some(current) = self.current.take() {
            self.prev = Some(current);
        }

        let index = self.upcoming?;
        self.current = Some(index);
        self.upcoming = self.arena.next_of(index);
        self.arena.item(index)
    }

    /// Unlinks the item the cursor points at and returns it. The cursor stays valid and the
    /// next `advance` moves to the item that followed the removed one.
    pub fn remove_current(&mut self) -> Option<T> {
        let index = self.current.take()?;
        let next = self.arena.next_of(index);

        match self.prev {
            Some(prev) => self.arena.nodes[prev].next = next,
            None => self.stack.head = next,
        }
        self.stack.len -= 1;

        self.arena.release(index)
    }
}

/// The 256x16 grid of stacks a track uses to pair note-ons with note-offs
#[derive(Debug, Clone)]
pub struct NoteStackTable<T> {
    /// Shared node storage
    arena: StackArena<T>,
    /// One stack per (pitch, channel), pitch-major
    stacks: Box<[NoteStack]>,
}

impl<T> Default for NoteStackTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> NoteStackTable<T> {
    /// Creates a table of empty stacks
    pub fn new() -> Self {
        Self {
            arena: StackArena::new(),
            stacks: vec![NoteStack::new(); PITCHES * CHANNELS].into_boxed_slice(),
        }
    }

    /// Index of the stack for a pitch and channel
    fn slot(pitch: u8, channel: u8) -> usize {
        usize::from(pitch) * CHANNELS + usize::from(channel & 0x0F)
    }

    /// Pushes onto the (pitch, channel) stack
    pub fn push(&mut self, pitch: u8, channel: u8, item: T) {
        self.stacks[Self::slot(pitch, channel)].push(&mut self.arena, item);
    }

    /// Pops the most recent item of the (pitch, channel) stack, `None` if it is empty
    pub fn pop(&mut self, pitch: u8, channel: u8) -> Option<T> {
        self.stacks[Self::slot(pitch, channel)].pop(&mut self.arena)
    }

    /// Returns if the (pitch, channel) stack is empty
    pub fn is_empty(&self, pitch: u8, channel: u8) -> bool {
        self.stacks[Self::slot(pitch, channel)].is_empty()
    }

    /// Number of items across every stack
    pub fn open(&self) -> usize {
        self.arena.live()
    }

    /// Empties every stack, handing each item to `f`, top of each stack first
    pub fn drain_all(&mut self, mut f: impl FnMut(T)) {
        for stack in self.stacks.iter_mut() {
            if stack.is_empty() {
                continue;
            }

            let mut cursor = stack.cursor(&mut self.arena);
            while cursor.advance().is_some() {
                if let Some(item) = cursor.remove_current() {
                    f(item);
                }
            }
        }
    }
}

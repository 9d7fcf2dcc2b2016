use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};

use crate::document::ItemId;
use crate::render::ScreenPoint;
use crate::scale::ZoomDirection;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind
{
    PointerDown,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointerEvent
{
    pub pointer_id: u32,
    pub position: ScreenPoint,
}

impl PointerEvent
{
    pub fn new(pointer_id: u32, x: f64, y: f64) -> PointerEvent
    {
        PointerEvent { pointer_id, position: ScreenPoint::new(x, y) }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZoomEvent
{
    pub center: ScreenPoint,
    pub direction: ZoomDirection,
}

/// Focus transitions reported back to the document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FocusChange
{
    Gained(ItemId),
    Lost(ItemId),
}

type ListenerId = u64;

#[derive(Debug, Default)]
struct ListenerTable
{
    next_id: ListenerId,
    listeners: HashMap<EventKind, Vec<(ListenerId, ItemId)>>,
}

/// Registry of which items listen to which events.
///
/// Cloning the bus shares the registry. Listeners are removed when their
/// `Subscription` is dropped.
#[derive(Clone, Debug, Default)]
pub struct EventBus
{
    table: Rc<RefCell<ListenerTable>>,
}

impl EventBus
{
    pub fn new() -> EventBus
    {
        EventBus::default()
    }

    /// Registers `target` for `kind` until the returned handle is dropped.
    ///
    /// # Example
    /// ```
    /// use geqsplot::document::ItemId;
    /// use geqsplot::events::{EventBus, EventKind};
    ///
    /// let bus = EventBus::new();
    /// let sub = bus.subscribe(EventKind::PointerDown, ItemId(3));
    /// assert_eq!(bus.listeners(EventKind::PointerDown), vec![ItemId(3)]);
    ///
    /// drop(sub);
    /// assert!(bus.listeners(EventKind::PointerDown).is_empty());
    /// ```
    pub fn subscribe(&self, kind: EventKind, target: ItemId) -> Subscription
    {
        let mut table = self.table.borrow_mut();
        let id = table.next_id;
        table.next_id += 1;
        table.listeners.entry(kind).or_default().push((id, target));
        Subscription { table: Rc::downgrade(&self.table), kind, id }
    }

    /// Current listeners of `kind` in registration order.
    ///
    /// The list is a copy, so listeners may subscribe or unsubscribe while it is walked.
    pub fn listeners(&self, kind: EventKind) -> Vec<ItemId>
    {
        self.table.borrow()
            .listeners
            .get(&kind)
            .map(|l| l.iter().map(|(_, target)| *target).collect())
            .unwrap_or_default()
    }

    pub fn listener_count(&self) -> usize
    {
        self.table.borrow().listeners.values().map(Vec::len).sum()
    }
}

/// Keeps a listener registered. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription
{
    table: Weak<RefCell<ListenerTable>>,
    kind: EventKind,
    id: ListenerId,
}

impl Subscription
{
    pub fn kind(&self) -> EventKind
    {
        self.kind
    }
}

impl Drop for Subscription
{
    fn drop(&mut self)
    {
        let table = match self.table.upgrade()
        {
            Some(table) => table,
            None => return, // the bus is already gone
        };
        let mut table = match table.try_borrow_mut()
        {
            Ok(table) => table,
            Err(_) => {
                log::warn!("event bus busy, listener {} of {:?} left registered", self.id, self.kind);
                return;
            },
        };
        if let Some(listeners) = table.listeners.get_mut(&self.kind)
        {
            listeners.retain(|(id, _)| *id != self.id);
            if listeners.is_empty()
            {
                table.listeners.remove(&self.kind);
            }
        }
    }
}

#[test]
fn test_subscriptions_are_ordered_and_released()
{
    let bus = EventBus::new();
    let a = bus.subscribe(EventKind::PointerDown, ItemId(1));
    let b = bus.subscribe(EventKind::PointerDown, ItemId(2));
    let c = bus.subscribe(EventKind::PointerDown, ItemId(1));
    assert_eq!(bus.listeners(EventKind::PointerDown), vec![ItemId(1), ItemId(2), ItemId(1)]);
    assert_eq!(bus.listener_count(), 3);
    assert_eq!(c.kind(), EventKind::PointerDown);

    drop(a);
    assert_eq!(bus.listeners(EventKind::PointerDown), vec![ItemId(2)]);
    drop(b);
    drop(c);
    assert_eq!(bus.listener_count(), 0);
}

#[test]
fn test_subscription_outliving_bus()
{
    let bus = EventBus::new();
    let sub = bus.subscribe(EventKind::PointerDown, ItemId(9));
    drop(bus);
    drop(sub);
}

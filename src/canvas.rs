use crate::command::{Command, CommandStatus, FunctionCommand, PointCommand, PointerOutcome};
use crate::config::PlotConfig;
use crate::document::{ExpressionItem, ItemId};
use crate::events::{EventBus, EventKind, FocusChange, PointerEvent, ZoomEvent};
use crate::render::{Color, DrawList, DrawOp, GraphPoint, ScreenPoint};
use crate::scale::Scale;
use crate::transform::ParsedContent;

fn find_command(commands: &mut [Command], id: ItemId) -> Option<&mut Command>
{
    commands.iter_mut().find(|c| c.item_id() == Some(id))
}

/// The viewport, the commands drawn into it and the pointer routing between them.
#[derive(Debug)]
pub struct Canvas
{
    scale: Scale,
    config: PlotConfig,
    commands: Vec<Command>,
    bus: EventBus,
    /// Pointer currently dragging a command.
    capture: Option<(u32, ItemId)>,
    /// Pointer panning the viewport and where it was last seen.
    pan: Option<(u32, ScreenPoint)>,
}

impl Canvas
{
    pub fn new(config: PlotConfig) -> Canvas
    {
        Canvas {
            scale: Scale::new(&config),
            config,
            commands: vec![Command::Grid, Command::Axis],
            bus: EventBus::new(),
            capture: None,
            pan: None,
        }
    }

    pub fn scale(&self) -> &Scale
    {
        &self.scale
    }

    pub fn scale_mut(&mut self) -> &mut Scale
    {
        &mut self.scale
    }

    pub fn config(&self) -> &PlotConfig
    {
        &self.config
    }

    pub fn commands(&self) -> &[Command]
    {
        &self.commands
    }

    pub fn command(&self, id: ItemId) -> Option<&Command>
    {
        self.commands.iter().find(|c| c.item_id() == Some(id))
    }

    pub fn bus(&self) -> &EventBus
    {
        &self.bus
    }

    pub fn is_captured(&self) -> bool
    {
        self.capture.is_some()
    }

    /// Rebuilds the command list from the document, reusing commands whose item did not change.
    ///
    /// Returns `Lost` for every focused command that no longer has a drawable item.
    pub fn sync(&mut self, items: &[ExpressionItem]) -> Vec<FocusChange>
    {
        let mut old = std::mem::take(&mut self.commands);
        let mut commands = vec![Command::Grid, Command::Axis];
        old.retain(|c| c.item_id().is_some());

        for item in items
        {
            let settings = match item.settings()
            {
                // an item whose latest edit was rejected keeps drawing its previous definition
                Some(settings) if item.parsed().is_some() => settings,
                _ => continue,
            };
            let reused = old.iter()
                .position(|c| c.item_id() == Some(item.id()))
                .map(|pos| old.swap_remove(pos));

            let mut command = match (item.parsed(), item.model(), reused)
            {
                (Some(ParsedContent::Function(_)), Some(model), Some(Command::Function(mut c))) => {
                    if c.revision() != item.revision()
                    {
                        c.set_model(item.revision(), model.clone());
                    }
                    Command::Function(c)
                },
                (Some(ParsedContent::Function(_)), Some(model), _) => {
                    Command::Function(FunctionCommand::new(item.id(), item.revision(), model.clone(), settings.clone(), &self.bus))
                },
                (Some(ParsedContent::Point(point)), _, Some(Command::Point(mut c))) => {
                    if c.revision() != item.revision()
                    {
                        c.set_position(item.revision(), GraphPoint::new(point.value.0, point.value.1));
                    }
                    Command::Point(c)
                },
                (Some(ParsedContent::Point(point)), _, _) => {
                    let position = GraphPoint::new(point.value.0, point.value.1);
                    Command::Point(PointCommand::new(item.id(), item.revision(), position, settings.clone(), &self.bus))
                },
                _ => continue,
            };
            command.set_settings(settings);
            commands.push(command);
        }

        let mut lost = Vec::new();
        for stale in old
        {
            if let Some(id) = stale.item_id()
            {
                if stale.status() != CommandStatus::Idle
                {
                    lost.push(FocusChange::Lost(id));
                }
                if self.capture.map_or(false, |(_, held)| held == id)
                {
                    log::debug!("releasing capture of removed expression {}", id.0);
                    self.capture = None;
                }
            }
        }
        self.commands = commands;
        lost
    }

    /// Draw instructions for the current state, starting with a clear.
    pub fn draw_frame(&mut self) -> Vec<DrawOp>
    {
        let mut list = DrawList::new();
        list.push(DrawOp::Clear { color: Color::WHITE });
        for command in self.commands.iter_mut()
        {
            command.draw(&self.scale, &self.config, &mut list);
        }
        list.into_ops()
    }

    /// Routes a pointer-down to the commands listening for it.
    ///
    /// Focused commands are asked first, then the rest from the top of the
    /// paint order down. At most one command claims the pointer; every
    /// other focused command loses focus. A press nobody claims starts a pan.
    pub fn on_pointer_down(&mut self, event: PointerEvent) -> Vec<FocusChange>
    {
        if let Some((held, id)) = self.capture.take()
        {
            if let Some(command) = find_command(&mut self.commands, id)
            {
                command.pointer_up();
            }
            log::debug!("pointer {} ended the drag of pointer {}", event.pointer_id, held);
            return Vec::new();
        }

        let p = self.scale.to_graph(event.position);
        let listeners = self.bus.listeners(EventKind::PointerDown);
        let (mut order, rest): (Vec<ItemId>, Vec<ItemId>) = listeners.into_iter().partition(|id| {
            self.command(*id).map_or(false, |c| c.status() != CommandStatus::Idle)
        });
        order.extend(rest.into_iter().rev());

        let mut changes = Vec::new();
        let mut claimed = false;
        for id in order
        {
            let command = match find_command(&mut self.commands, id)
            {
                Some(command) => command,
                None => continue,
            };
            if claimed
            {
                changes.extend(command.blur());
                continue;
            }
            match command.pointer_down(p, &self.scale, &self.config)
            {
                PointerOutcome::Claimed { focus, capture } => {
                    claimed = true;
                    changes.extend(focus);
                    if capture
                    {
                        log::debug!("pointer {} captured by expression {}", event.pointer_id, id.0);
                        self.capture = Some((event.pointer_id, id));
                    }
                },
                PointerOutcome::Missed(focus) => changes.extend(focus),
            }
        }

        if !claimed
        {
            self.pan = Some((event.pointer_id, event.position));
        }
        changes
    }

    pub fn on_pointer_move(&mut self, event: PointerEvent)
    {
        if let Some((held, id)) = self.capture
        {
            if held == event.pointer_id
            {
                let p = self.scale.to_graph(event.position);
                if let Some(command) = find_command(&mut self.commands, id)
                {
                    command.pointer_move(p);
                }
            }
            return;
        }
        if let Some((held, last)) = self.pan
        {
            if held == event.pointer_id
            {
                self.scale.pan(event.position.x - last.x, event.position.y - last.y);
                self.pan = Some((held, event.position));
            }
        }
    }

    pub fn on_pointer_up(&mut self, event: PointerEvent)
    {
        if let Some((held, id)) = self.capture
        {
            if held == event.pointer_id
            {
                if let Some(command) = find_command(&mut self.commands, id)
                {
                    command.pointer_up();
                }
                self.capture = None;
            }
        }
        if self.pan.map_or(false, |(held, _)| held == event.pointer_id)
        {
            self.pan = None;
        }
    }

    pub fn on_zoom(&mut self, event: ZoomEvent)
    {
        self.scale.zoom(event.center, event.direction);
    }

    pub fn on_resize(&mut self, width: f64, height: f64)
    {
        self.scale.resize(width, height);
    }

    /// Mirrors focus set from outside the canvas onto the item's command.
    pub fn set_external_focus(&mut self, id: ItemId, focused: bool)
    {
        if let Some(command) = find_command(&mut self.commands, id)
        {
            if focused
            {
                command.focus();
            }
            else
            {
                command.blur();
                if self.capture.map_or(false, |(_, held)| held == id)
                {
                    self.capture = None;
                }
            }
        }
    }
}

#[cfg(test)]
fn canvas_with(lines: &[&str]) -> (Canvas, crate::document::Document, Vec<ItemId>)
{
    let mut doc = crate::document::Document::new();
    let mut ids = Vec::new();
    for line in lines
    {
        let id = doc.insert();
        doc.set_text(id, line).unwrap();
        ids.push(id);
    }
    let mut canvas = Canvas::new(PlotConfig::default());
    canvas.sync(doc.items());
    (canvas, doc, ids)
}

#[test]
fn test_sync_builds_commands()
{
    let (canvas, _, ids) = canvas_with(&["a = 1", "y = a x", "(a, 2)"]);
    assert_eq!(canvas.commands().len(), 4);
    assert!(matches!(canvas.command(ids[1]), Some(Command::Function(_))));
    assert!(matches!(canvas.command(ids[2]), Some(Command::Point(_))));
    assert_eq!(canvas.bus().listener_count(), 2);
}

#[test]
fn test_sync_drops_removed_items()
{
    let (mut canvas, mut doc, ids) = canvas_with(&["y = x"]);
    let origin = canvas.scale().to_screen(GraphPoint::new(0.0, 0.0));
    canvas.on_pointer_down(PointerEvent::new(0, origin.x, origin.y));

    doc.delete(ids[0]);
    assert_eq!(canvas.sync(doc.items()), vec![FocusChange::Lost(ids[0])]);
    assert_eq!(canvas.bus().listener_count(), 0);
}

#[test]
fn test_only_one_command_claims_a_press()
{
    // both lines pass through the origin
    let (mut canvas, _, ids) = canvas_with(&["y = x", "y = 2x"]);
    let origin = canvas.scale().to_screen(GraphPoint::new(0.0, 0.0));

    let changes = canvas.on_pointer_down(PointerEvent::new(0, origin.x, origin.y));
    assert_eq!(changes, vec![FocusChange::Gained(ids[1])]);
    assert_eq!(canvas.command(ids[0]).unwrap().status(), CommandStatus::Idle);
}

#[test]
fn test_drag_capture_and_second_pointer()
{
    let (mut canvas, _, ids) = canvas_with(&["y = x^2"]);
    let on_curve = canvas.scale().to_screen(GraphPoint::new(1.0, 1.0));

    canvas.on_pointer_down(PointerEvent::new(0, on_curve.x, on_curve.y));
    canvas.on_pointer_down(PointerEvent::new(0, on_curve.x, on_curve.y));
    assert!(canvas.is_captured());
    assert_eq!(canvas.command(ids[0]).unwrap().status(), CommandStatus::Dragged);

    // a second finger only ends the drag
    assert!(canvas.on_pointer_down(PointerEvent::new(1, 10.0, 10.0)).is_empty());
    assert!(!canvas.is_captured());
    assert_eq!(canvas.command(ids[0]).unwrap().status(), CommandStatus::Focused);
}

#[test]
fn test_empty_press_pans()
{
    let (mut canvas, _, _) = canvas_with(&[]);
    canvas.on_pointer_down(PointerEvent::new(0, 100.0, 100.0));
    canvas.on_pointer_move(PointerEvent::new(0, 140.0, 80.0));
    canvas.on_pointer_up(PointerEvent::new(0, 140.0, 80.0));
    assert_eq!(canvas.scale().offset(), (40.0, -20.0));

    // moves after release do nothing
    canvas.on_pointer_move(PointerEvent::new(0, 200.0, 200.0));
    assert_eq!(canvas.scale().offset(), (40.0, -20.0));
}

#[test]
fn test_frame_starts_with_clear()
{
    let (mut canvas, _, _) = canvas_with(&["y = sin(x)"]);
    let ops = canvas.draw_frame();
    assert_eq!(ops[0], DrawOp::Clear { color: Color::WHITE });
    assert!(ops.iter().any(|op| matches!(op, DrawOp::Polyline { .. })));
}

#[test]
fn test_rejected_cycle_keeps_previous_curve()
{
    use crate::document::ItemStatus;

    let (mut canvas, mut doc, ids) = canvas_with(&["f(x) = x", "g(x) = f(x) + 1"]);
    assert!(doc.set_text(ids[0], "f(x) = g(x)").is_err());
    canvas.sync(doc.items());

    assert!(matches!(doc.item(ids[0]).unwrap().status(), ItemStatus::Failed(_)));
    assert!(matches!(canvas.command(ids[0]), Some(Command::Function(_))));
    assert!(matches!(canvas.command(ids[1]), Some(Command::Function(_))));
}

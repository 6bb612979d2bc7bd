use std::sync::mpsc;

use glam::{Quat, Vec3};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hand {
    Left,
    Right,
}

/// Controller buttons in polling priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerButton {
    Trigger,
    /// A on the right controller, X on the left.
    Primary,
    /// B on the right controller, Y on the left.
    Secondary,
    Squeeze,
    Thumbstick,
}

impl ControllerButton {
    pub const ALL: [Self; 5] = [
        Self::Trigger,
        Self::Primary,
        Self::Secondary,
        Self::Squeeze,
        Self::Thumbstick,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerPose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Default for ControllerPose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
        }
    }
}

/// Input delivered from the host loop to the scene update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SceneEvent {
    Trigger { hand: Hand, pose: ControllerPose },
    ButtonPressed { hand: Hand, button: ControllerButton },
    EndSessionRequested,
    EndSessionCancelled,
    EndSessionConfirmed,
}

impl SceneEvent {
    pub fn ends_session(&self) -> bool {
        matches!(self, Self::EndSessionConfirmed)
    }
}

/// Two-step end-of-session flow: the right secondary button asks, the right
/// primary button confirms, anything else cancels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionConfirmation {
    awaiting: bool,
}

impl SessionConfirmation {
    pub fn is_awaiting(&self) -> bool {
        self.awaiting
    }

    /// Handles the clicks of one controller for one frame. Only the highest
    /// priority click is considered.
    pub fn poll(
        &mut self,
        hand: Hand,
        clicked: &[ControllerButton],
        pose: ControllerPose,
    ) -> Option<SceneEvent> {
        let button = ControllerButton::ALL
            .into_iter()
            .find(|button| clicked.contains(button))?;
        Some(self.handle(hand, button, pose))
    }

    pub fn handle(
        &mut self,
        hand: Hand,
        button: ControllerButton,
        pose: ControllerPose,
    ) -> SceneEvent {
        let was_awaiting = std::mem::take(&mut self.awaiting);

        let event = match (hand, button) {
            (_, ControllerButton::Trigger) => SceneEvent::Trigger { hand, pose },
            (Hand::Right, ControllerButton::Primary) if was_awaiting => {
                SceneEvent::EndSessionConfirmed
            }
            (Hand::Right, ControllerButton::Secondary) if !was_awaiting => {
                self.awaiting = true;
                SceneEvent::EndSessionRequested
            }
            _ if was_awaiting => SceneEvent::EndSessionCancelled,
            _ => SceneEvent::ButtonPressed { hand, button },
        };

        match event {
            SceneEvent::EndSessionRequested => info!("end session requested, awaiting confirmation"),
            SceneEvent::EndSessionConfirmed => info!("end session confirmed"),
            SceneEvent::EndSessionCancelled => info!("end session cancelled"),
            SceneEvent::Trigger { .. } if was_awaiting => info!("end session cancelled by trigger"),
            _ => {}
        }

        event
    }
}

pub struct EventSender<T> {
    tx: mpsc::Sender<T>,
}

pub struct EventReceiver<T> {
    rx: mpsc::Receiver<T>,
}

pub fn channel<T>() -> (EventSender<T>, EventReceiver<T>) {
    let (tx, rx) = mpsc::channel();
    (EventSender { tx }, EventReceiver { rx })
}

impl<T> Clone for EventSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> EventSender<T> {
    pub fn send(&self, event: T) -> Result<(), mpsc::SendError<T>> {
        self.tx.send(event)
    }
}

impl<T> EventReceiver<T> {
    /// Everything queued since the last frame, without blocking.
    pub fn drain(&self) -> Vec<T> {
        self.rx.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{channel, ControllerButton, ControllerPose, Hand, SceneEvent, SessionConfirmation};

    #[test]
    fn request_then_confirm_ends_session() {
        let mut flow = SessionConfirmation::default();
        let pose = ControllerPose::default();

        let request = flow.handle(Hand::Right, ControllerButton::Secondary, pose);
        assert_eq!(request, SceneEvent::EndSessionRequested);
        assert!(flow.is_awaiting());

        let confirm = flow.handle(Hand::Right, ControllerButton::Primary, pose);
        assert!(confirm.ends_session());
        assert!(!flow.is_awaiting());
    }

    #[test]
    fn primary_without_request_is_a_plain_press() {
        let mut flow = SessionConfirmation::default();
        let event = flow.handle(Hand::Right, ControllerButton::Primary, ControllerPose::default());
        assert_eq!(
            event,
            SceneEvent::ButtonPressed {
                hand: Hand::Right,
                button: ControllerButton::Primary,
            }
        );
    }

    #[test]
    fn other_buttons_cancel_a_pending_request() {
        let pose = ControllerPose::default();
        for (hand, button) in [
            (Hand::Right, ControllerButton::Secondary),
            (Hand::Right, ControllerButton::Squeeze),
            (Hand::Left, ControllerButton::Primary),
            (Hand::Left, ControllerButton::Secondary),
        ] {
            let mut flow = SessionConfirmation::default();
            flow.handle(Hand::Right, ControllerButton::Secondary, pose);
            assert_eq!(flow.handle(hand, button, pose), SceneEvent::EndSessionCancelled);
            assert!(!flow.is_awaiting());
        }
    }

    #[test]
    fn trigger_carries_pose_and_cancels() {
        let mut flow = SessionConfirmation::default();
        let pose = ControllerPose {
            position: glam::Vec3::new(0.15, 1.4, -0.38),
            ..ControllerPose::default()
        };
        flow.handle(Hand::Right, ControllerButton::Secondary, pose);

        let event = flow.handle(Hand::Left, ControllerButton::Trigger, pose);
        assert_eq!(event, SceneEvent::Trigger { hand: Hand::Left, pose });
        assert!(!flow.is_awaiting());
    }

    #[test]
    fn poll_takes_highest_priority_click() {
        let mut flow = SessionConfirmation::default();
        let pose = ControllerPose::default();

        assert_eq!(flow.poll(Hand::Right, &[], pose), None);
        let event = flow.poll(
            Hand::Right,
            &[ControllerButton::Secondary, ControllerButton::Trigger],
            pose,
        );
        assert!(matches!(event, Some(SceneEvent::Trigger { .. })));
    }

    #[test]
    fn channel_drains_in_order() {
        let (tx, rx) = channel();
        tx.send(SceneEvent::EndSessionRequested).unwrap();
        tx.clone().send(SceneEvent::EndSessionCancelled).unwrap();

        assert_eq!(
            rx.drain(),
            vec![SceneEvent::EndSessionRequested, SceneEvent::EndSessionCancelled]
        );
        assert!(rx.drain().is_empty());
    }
}

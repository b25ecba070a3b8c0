#[cfg(feature = "rtrb")]
use rtrb::Consumer;

/// Note commands sent from a host thread to the tick thread
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NoteMessage {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    AllNotesOff,
}

pub trait MessageReceiver {
    fn pop(&mut self) -> Option<NoteMessage>;
}

#[cfg(feature = "rtrb")]
impl MessageReceiver for Consumer<NoteMessage> {
    fn pop(&mut self) -> Option<NoteMessage> {
        Consumer::pop(self).ok()
    }
}

#[cfg(all(test, feature = "rtrb"))]
mod tests {
    use super::*;
    use rtrb::RingBuffer;

    #[test]
    fn test_consumer_drains_in_order() {
        let (mut tx, mut rx) = RingBuffer::<NoteMessage>::new(4);
        tx.push(NoteMessage::NoteOn {
            note: 60,
            velocity: 100,
        })
        .unwrap();
        tx.push(NoteMessage::NoteOff { note: 60 }).unwrap();

        let receiver: &mut dyn MessageReceiver = &mut rx;
        assert_eq!(
            receiver.pop(),
            Some(NoteMessage::NoteOn {
                note: 60,
                velocity: 100
            })
        );
        assert_eq!(receiver.pop(), Some(NoteMessage::NoteOff { note: 60 }));
        assert_eq!(receiver.pop(), None);
    }
}

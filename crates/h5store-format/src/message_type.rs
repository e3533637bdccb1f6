//! Object header message type ids.

macro_rules! message_types {
    ($($name:ident = $id:literal,)*) => {
        /// Header messages that matter for locating dataset storage. Every
        /// other message is carried as [`MessageType::Unknown`] and skipped.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum MessageType {
            $($name,)*
            Unknown(u16),
        }

        impl MessageType {
            pub fn from_u16(raw: u16) -> MessageType {
                match raw {
                    $($id => MessageType::$name,)*
                    other => MessageType::Unknown(other),
                }
            }

            /// The id written in the message header.
            pub fn id(self) -> u16 {
                match self {
                    $(MessageType::$name => $id,)*
                    MessageType::Unknown(raw) => raw,
                }
            }
        }
    };
}

message_types! {
    Nil = 0x0000,
    Dataspace = 0x0001,
    LinkInfo = 0x0002,
    Datatype = 0x0003,
    Link = 0x0006,
    DataLayout = 0x0008,
    GroupInfo = 0x000A,
    ObjectHeaderContinuation = 0x0010,
    SymbolTable = 0x0011,
}

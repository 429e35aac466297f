use bitflags::bitflags;

bitflags! {
    /// Submission flags passed through to the transport with a `Msg`.
    ///
    /// The session layer does not interpret them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MsgFlags: u32 {
        /// Ask the peer to acknowledge reception before the reply is produced.
        const REQUEST_READ_RECEIPT = 0b01;
        /// Ask the transport to signal local send completion immediately.
        const IMM_SEND_COMP = 0b10;
    }
}

//! Thin builder for legacy-versioned transaction messages.

use std::sync::Arc;

use solana_compute_budget_interface::ComputeBudgetInstruction;
use solana_hash::Hash;
use solana_instruction::Instruction;
use solana_message::{Message, VersionedMessage};
use solana_pubkey::Pubkey;
use solana_signer::signers::Signers;
use solana_transaction::versioned::VersionedTransaction;
use tracing::debug;

use crate::blockhash::fetch_latest_blockhash;
use crate::connection::ProviderConnection;
use crate::error::SenderError;
use crate::types::Commitment;

/// Assembles a legacy message from a fee payer and instructions.
///
/// Compute-budget instructions, when requested, are placed ahead of the
/// caller's instructions. The builder itself is pure; fetching a
/// blockhash and broadcasting belong to
/// [`fetch_latest_blockhash`] and [`RetrySender`](crate::RetrySender).
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    payer: Pubkey,
    instructions: Vec<Instruction>,
    compute_unit_limit: Option<u32>,
    priority_fee_micro_lamports: Option<u64>,
}

impl TransactionBuilder {
    /// Creates a builder for a fee payer.
    #[must_use]
    pub const fn new(payer: Pubkey) -> Self {
        Self {
            payer,
            instructions: Vec::new(),
            compute_unit_limit: None,
            priority_fee_micro_lamports: None,
        }
    }

    /// Appends one instruction.
    #[must_use]
    pub fn add_instruction(mut self, instruction: Instruction) -> Self {
        self.instructions.push(instruction);
        self
    }

    /// Appends many instructions.
    #[must_use]
    pub fn add_instructions<I>(mut self, instructions: I) -> Self
    where
        I: IntoIterator<Item = Instruction>,
    {
        self.instructions.extend(instructions);
        self
    }

    /// Sets the compute unit limit.
    #[must_use]
    pub const fn with_compute_unit_limit(mut self, units: u32) -> Self {
        self.compute_unit_limit = Some(units);
        self
    }

    /// Sets the priority fee in micro-lamports per compute unit.
    #[must_use]
    pub const fn with_priority_fee_micro_lamports(mut self, micro_lamports: u64) -> Self {
        self.priority_fee_micro_lamports = Some(micro_lamports);
        self
    }

    /// Builds a legacy message wrapped as a versioned message.
    #[must_use]
    pub fn build_message(self, recent_blockhash: Hash) -> VersionedMessage {
        let mut instructions = Vec::new();
        if let Some(units) = self.compute_unit_limit {
            instructions.push(ComputeBudgetInstruction::set_compute_unit_limit(units));
        }
        if let Some(micro_lamports) = self.priority_fee_micro_lamports {
            instructions.push(ComputeBudgetInstruction::set_compute_unit_price(micro_lamports));
        }
        instructions.extend(self.instructions);
        let message =
            Message::new_with_blockhash(&instructions, Some(&self.payer), &recent_blockhash);
        VersionedMessage::Legacy(message)
    }

    /// Builds and signs a transaction against a known blockhash.
    ///
    /// # Errors
    ///
    /// Returns [`SenderError::Sign`] when signer validation or signing
    /// fails.
    pub fn build_and_sign<T>(
        self,
        recent_blockhash: Hash,
        signers: &T,
    ) -> Result<VersionedTransaction, SenderError>
    where
        T: Signers + ?Sized,
    {
        let transaction = VersionedTransaction::try_new(self.build_message(recent_blockhash), signers)?;
        Ok(transaction)
    }

    /// Fetches the freshest blockhash from `connections`, then builds and
    /// signs the transaction against it.
    ///
    /// Returns the transaction together with the blockhash's expiry
    /// height, ready to hand to
    /// [`RetrySender::try_confirm`](crate::RetrySender::try_confirm).
    ///
    /// # Errors
    ///
    /// Returns [`SenderError::BlockhashUnavailable`] when no provider
    /// answers, and [`SenderError::Sign`] when signing fails.
    pub async fn build_with_latest_blockhash<T>(
        self,
        connections: &[Arc<dyn ProviderConnection>],
        commitment: Commitment,
        signers: &T,
    ) -> Result<(VersionedTransaction, u64), SenderError>
    where
        T: Signers + ?Sized,
    {
        let info = fetch_latest_blockhash(connections, commitment).await?;
        debug!(
            expiry_height = info.last_valid_block_height,
            "building transaction against latest blockhash"
        );
        let transaction = self.build_and_sign(info.blockhash, signers)?;
        Ok((transaction, info.last_valid_block_height))
    }
}

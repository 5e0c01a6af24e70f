use std::collections::{BTreeMap, BTreeSet};

use anchor_lang::prelude::*;
use anchor_lang::solana_program::program_option::COption;
use anchor_spl::associated_token::{self, get_associated_token_address_with_program_id};
use anchor_spl::token_interface::TokenAccount;
use anchor_spl::{token, token_2022};

use crate::instructions::fulfill::FulfillContext;
use crate::instructions::{Fund, FundFor, PortalError};
use crate::state::PERMIT_SEED;
use crate::types::{TokenTransferAccounts, VecTokenTransferAccounts};

/// Funding plumbing shared by every instruction that moves tokens into a
/// program-derived account: vault funding and executor prefunding. The
/// transferred amount per mint is `required − already_held`, capped by what
/// the funder actually has, so re-funding is idempotent and never
/// over-transfers.
pub struct FundTokenContext<'a, 'info> {
    pub payer: &'a Signer<'info>,
    pub funder: &'a Signer<'info>,
    pub fundee: AccountInfo<'info>,
    pub token_program: &'a Program<'info, token::Token>,
    pub token_2022_program: &'a Program<'info, token_2022::Token2022>,
    pub associated_token_program: &'a Program<'info, associated_token::AssociatedToken>,
    pub system_program: &'a Program<'info, System>,
}

impl<'a, 'info> From<&'a Context<'_, '_, '_, 'info, Fund<'info>>> for FundTokenContext<'a, 'info> {
    fn from(ctx: &'a Context<'_, '_, '_, 'info, Fund<'info>>) -> Self {
        Self {
            payer: &ctx.accounts.payer,
            funder: &ctx.accounts.funder,
            fundee: ctx.accounts.vault.to_account_info(),
            token_program: &ctx.accounts.token_program,
            token_2022_program: &ctx.accounts.token_2022_program,
            associated_token_program: &ctx.accounts.associated_token_program,
            system_program: &ctx.accounts.system_program,
        }
    }
}

impl<'a, 'info> From<&FulfillContext<'a, 'info>> for FundTokenContext<'a, 'info> {
    fn from(ctx: &FulfillContext<'a, 'info>) -> Self {
        Self {
            payer: ctx.payer,
            funder: ctx.solver,
            fundee: ctx.executor.clone(),
            token_program: ctx.token_program,
            token_2022_program: ctx.token_2022_program,
            associated_token_program: ctx.associated_token_program,
            system_program: ctx.system_program,
        }
    }
}

impl<'info> FundTokenContext<'_, 'info> {
    /// Funds every provided `(from, to, mint)` triple toward its required
    /// amount and returns the mints whose requirement is now fully covered.
    pub fn fund_tokens(
        self,
        accounts: VecTokenTransferAccounts<'info>,
        token_amounts: &BTreeMap<Pubkey, u64>,
    ) -> Result<BTreeSet<Pubkey>> {
        accounts
            .into_inner()
            .into_iter()
            .map(|accounts| self.fund_token(accounts, token_amounts))
            .filter_map(|result| match result {
                Ok(Some(mint_key)) => Some(Ok(mint_key)),
                Ok(None) => None,
                Err(e) => Some(Err(e)),
            })
            .collect()
    }

    fn fund_token(
        &self,
        accounts: TokenTransferAccounts<'info>,
        token_amounts: &BTreeMap<Pubkey, u64>,
    ) -> Result<Option<Pubkey>> {
        let token_program = accounts.token_program(self.token_program, self.token_2022_program)?;
        let token_amount = token_amounts
            .get(accounts.mint.key)
            .ok_or(PortalError::InvalidMint)?;
        let to_data = ensure_fundee_ata_initialized(
            self.payer,
            &self.fundee,
            &accounts.mint,
            &accounts.to,
            &token_program,
            accounts.token_program_id(),
            self.associated_token_program,
            self.system_program,
        )?;
        let from_data = accounts.from_data()?;

        token_amount
            .checked_sub(to_data.amount)
            .map(|amount| amount.min(from_data.amount))
            .filter(|&amount| amount > 0)
            .map(|amount| accounts.transfer(&token_program, self.funder, amount))
            .transpose()?;

        if accounts.to_data()?.amount >= *token_amount {
            Ok(Some(accounts.mint.key()))
        } else {
            Ok(None)
        }
    }
}

/// Permit-funding variant of [`FundTokenContext`]: transfers draw on an SPL
/// delegate approval the funder granted to their portal permit PDA, so the
/// funder does not sign the funding transaction itself.
pub struct PermitTokenContext<'a, 'info> {
    pub payer: &'a Signer<'info>,
    pub funder: Pubkey,
    pub permit: AccountInfo<'info>,
    pub permit_bump: u8,
    pub fundee: AccountInfo<'info>,
    pub token_program: &'a Program<'info, token::Token>,
    pub token_2022_program: &'a Program<'info, token_2022::Token2022>,
    pub associated_token_program: &'a Program<'info, associated_token::AssociatedToken>,
    pub system_program: &'a Program<'info, System>,
}

impl<'a, 'info> PermitTokenContext<'a, 'info> {
    pub fn new(ctx: &'a Context<'_, '_, '_, 'info, FundFor<'info>>, funder: Pubkey) -> Self {
        Self {
            payer: &ctx.accounts.payer,
            funder,
            permit: ctx.accounts.permit.to_account_info(),
            permit_bump: ctx.bumps.permit,
            fundee: ctx.accounts.vault.to_account_info(),
            token_program: &ctx.accounts.token_program,
            token_2022_program: &ctx.accounts.token_2022_program,
            associated_token_program: &ctx.accounts.associated_token_program,
            system_program: &ctx.accounts.system_program,
        }
    }

    pub fn fund_tokens(
        self,
        accounts: VecTokenTransferAccounts<'info>,
        token_amounts: &BTreeMap<Pubkey, u64>,
    ) -> Result<BTreeSet<Pubkey>> {
        accounts
            .into_inner()
            .into_iter()
            .map(|accounts| self.fund_token(accounts, token_amounts))
            .filter_map(|result| match result {
                Ok(Some(mint_key)) => Some(Ok(mint_key)),
                Ok(None) => None,
                Err(e) => Some(Err(e)),
            })
            .collect()
    }

    fn fund_token(
        &self,
        accounts: TokenTransferAccounts<'info>,
        token_amounts: &BTreeMap<Pubkey, u64>,
    ) -> Result<Option<Pubkey>> {
        let token_program = accounts.token_program(self.token_program, self.token_2022_program)?;
        let token_amount = token_amounts
            .get(accounts.mint.key)
            .ok_or(PortalError::InvalidMint)?;
        let to_data = ensure_fundee_ata_initialized(
            self.payer,
            &self.fundee,
            &accounts.mint,
            &accounts.to,
            &token_program,
            accounts.token_program_id(),
            self.associated_token_program,
            self.system_program,
        )?;
        let from_data = accounts.from_data()?;

        require!(
            from_data.owner == self.funder,
            PortalError::InvalidPermitAllowance
        );
        require!(
            from_data.delegate == COption::Some(self.permit.key()),
            PortalError::InvalidPermitAllowance
        );

        let signer_seeds: &[&[u8]] = &[
            PERMIT_SEED,
            self.funder.as_ref(),
            &[self.permit_bump],
        ];

        token_amount
            .checked_sub(to_data.amount)
            .map(|amount| amount.min(from_data.amount).min(from_data.delegated_amount))
            .filter(|&amount| amount > 0)
            .map(|amount| {
                accounts.transfer_with_signer(&token_program, &self.permit, &[signer_seeds], amount)
            })
            .transpose()?;

        if accounts.to_data()?.amount >= *token_amount {
            Ok(Some(accounts.mint.key()))
        } else {
            Ok(None)
        }
    }
}

/// Creates the fundee's associated token account on first use; later calls
/// just deserialize it. The fundee side of every funding transfer must be
/// the canonical ATA so balances stay discoverable from the mint alone.
#[allow(clippy::too_many_arguments)]
pub(crate) fn ensure_fundee_ata_initialized<'info>(
    payer: &Signer<'info>,
    fundee: &AccountInfo<'info>,
    mint: &AccountInfo<'info>,
    to: &AccountInfo<'info>,
    token_program: &AccountInfo<'info>,
    token_program_id: &Pubkey,
    associated_token_program: &Program<'info, associated_token::AssociatedToken>,
    system_program: &Program<'info, System>,
) -> Result<TokenAccount> {
    let fundee_ata =
        get_associated_token_address_with_program_id(fundee.key, mint.key, token_program_id);
    require!(fundee_ata == *to.key, PortalError::InvalidAta);

    if to.data_is_empty() {
        let cpi_accounts = associated_token::Create {
            payer: payer.to_account_info(),
            associated_token: to.to_account_info(),
            authority: fundee.to_account_info(),
            mint: mint.to_account_info(),
            system_program: system_program.to_account_info(),
            token_program: token_program.to_account_info(),
        };
        let cpi_ctx = CpiContext::new(associated_token_program.to_account_info(), cpi_accounts);

        associated_token::create(cpi_ctx)?;
    }

    TokenAccount::try_deserialize(&mut &to.try_borrow_data()?[..])
}

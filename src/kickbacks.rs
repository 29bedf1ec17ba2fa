use points_commit::Address;
use points_ledger::{Amount, KickbackAward, KickbackPolicy};
use referral_module::ReferralService;

/// Lets the accrual cycle ask the referral graph for kickbacks.
pub(crate) struct ReferralKickbacks<'a>(pub &'a ReferralService);

impl KickbackPolicy for ReferralKickbacks<'_> {
    fn kickbacks(&self, referee: &Address, earned: Amount) -> Vec<KickbackAward> {
        self.0
            .calculate_kickbacks(referee, earned)
            .into_iter()
            .map(|k| KickbackAward {
                referrer: k.referrer,
                depth: k.depth,
                amount: k.amount,
            })
            .collect()
    }
}

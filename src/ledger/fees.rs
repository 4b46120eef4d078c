// Fee structure ledger: every mutation of a student's totals goes through
// here so remaining, installment and per-semester figures stay in step.

use crate::models::{FeeStatus, FeeStructure, SemesterAllocation, SemesterFee};

use super::error::{LedgerError, Result};

/// Re-examination charge per back subject.
pub const BACK_SUBJECT_FEE: f64 = 500.0;

pub(crate) const MONEY_EPSILON: f64 = 0.005;

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn require_finite(value: f64, field: &str) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(LedgerError::validation(field, "must be a finite number"))
    }
}

fn installment_for(total: f64, installments: u32) -> f64 {
    (total / f64::from(installments.max(1))).ceil()
}

fn net_amount(amount: f64, discount: f64) -> Result<f64> {
    require_finite(amount, "amount")?;
    require_finite(discount, "discount")?;
    if amount <= 0.0 {
        return Err(LedgerError::validation(
            "amount",
            "amount must be greater than zero",
        ));
    }
    if discount < 0.0 {
        return Err(LedgerError::validation("discount", "discount cannot be negative"));
    }
    if discount > amount {
        return Err(LedgerError::validation(
            "discount",
            format!("discount {discount} cannot exceed amount {amount}"),
        ));
    }
    Ok(round2(amount - discount))
}

fn surcharge(count: usize, unit_fee: f64) -> Result<f64> {
    require_finite(unit_fee, "unit_fee")?;
    if unit_fee < 0.0 {
        return Err(LedgerError::validation("unit_fee", "unit fee cannot be negative"));
    }
    Ok(count as f64 * unit_fee)
}

/// Splits `total` across slots in proportion to `weights`, or evenly when
/// every weight is zero. The last slot absorbs rounding so the shares always
/// sum to `total`.
fn distribute(total: f64, weights: &[f64]) -> Vec<f64> {
    if weights.is_empty() {
        return Vec::new();
    }
    let sum: f64 = weights.iter().sum();
    let mut shares: Vec<f64> = if sum > MONEY_EPSILON {
        weights.iter().map(|w| round2(total * w / sum)).collect()
    } else {
        vec![round2(total / weights.len() as f64); weights.len()]
    };
    let head: f64 = shares[..shares.len() - 1].iter().sum();
    if let Some(last) = shares.last_mut() {
        *last = round2(total - head);
    }
    shares
}

impl FeeStructure {
    /// Builds the fee structure of a newly enrolled student. The template
    /// holds one base fee per semester; when it does not add up to
    /// `total_course_fee` the total is spread in the template's proportions.
    pub fn initialize(
        total_course_fee: f64,
        number_of_installments: u32,
        semester_template: &[f64],
    ) -> Result<Self> {
        require_finite(total_course_fee, "total_course_fee")?;
        let total_course_fee = round2(total_course_fee);
        if total_course_fee <= 0.0 {
            return Err(LedgerError::validation(
                "total_course_fee",
                "course fee must be greater than zero",
            ));
        }
        if number_of_installments == 0 {
            return Err(LedgerError::validation(
                "number_of_installments",
                "at least one installment is required",
            ));
        }
        if semester_template.is_empty() {
            return Err(LedgerError::validation(
                "semester_fees",
                "course has no semesters",
            ));
        }
        if semester_template.iter().any(|f| !f.is_finite() || *f < 0.0) {
            return Err(LedgerError::validation(
                "semester_fees",
                "semester fees must be non-negative numbers",
            ));
        }

        let installment_amount = installment_for(total_course_fee, number_of_installments);
        if installment_amount > total_course_fee + MONEY_EPSILON {
            return Err(LedgerError::validation(
                "installment_amount",
                format!(
                    "installment amount {installment_amount} exceeds total course fee {total_course_fee}"
                ),
            ));
        }

        let semester_fees = distribute(total_course_fee, semester_template)
            .into_iter()
            .enumerate()
            .map(|(idx, amount)| SemesterFee {
                semester_number: idx as u32 + 1,
                total_amount: amount,
                paid_amount: 0.0,
                remaining_amount: amount,
                back_subject_fees: 0.0,
            })
            .collect();

        Ok(FeeStructure {
            total_course_fee,
            total_paid: 0.0,
            remaining_amount: total_course_fee,
            number_of_installments,
            installment_amount,
            semester_fees,
        })
    }

    /// Credits `amount - discount` and returns how it was spread over the
    /// semesters, oldest outstanding semester first. Anything beyond the
    /// outstanding semester balances stays unallocated as overpayment.
    pub fn apply_payment(&mut self, amount: f64, discount: f64) -> Result<Vec<SemesterAllocation>> {
        let net = net_amount(amount, discount)?;

        let mut left = net;
        let mut allocations = Vec::new();
        for sem in &self.semester_fees {
            if left <= MONEY_EPSILON {
                break;
            }
            let room = (sem.total_amount - sem.paid_amount).max(0.0);
            if room <= MONEY_EPSILON {
                continue;
            }
            let take = round2(room.min(left));
            allocations.push(SemesterAllocation {
                semester_number: sem.semester_number,
                amount: take,
            });
            left -= take;
        }

        self.credit(net, &allocations);
        Ok(allocations)
    }

    /// Exact inverse of [`FeeStructure::apply_payment`]. `allocations` are
    /// the slices recorded when the payment was applied; when absent the
    /// unallocated overpayment is taken back first, then newest semester
    /// first.
    pub fn reverse_payment(
        &mut self,
        amount: f64,
        discount: f64,
        allocations: &[SemesterAllocation],
    ) -> Result<()> {
        let net = net_amount(amount, discount)?;
        if self.total_paid - net < -MONEY_EPSILON {
            return Err(LedgerError::validation(
                "amount",
                format!(
                    "reversing {net} would leave total paid at {}",
                    self.total_paid - net
                ),
            ));
        }

        let allocations = if allocations.is_empty() {
            self.plan_unwind(net)
        } else {
            allocations.to_vec()
        };

        self.total_paid -= net;
        for allocation in &allocations {
            if let Some(sem) = self.semester_mut(allocation.semester_number) {
                sem.paid_amount -= allocation.amount;
            }
        }
        self.recompute();
        Ok(())
    }

    /// Puts a reversed payment back exactly as it was first applied.
    pub(crate) fn restore_payment(
        &mut self,
        amount: f64,
        discount: f64,
        allocations: &[SemesterAllocation],
    ) -> Result<()> {
        let net = net_amount(amount, discount)?;
        self.credit(net, allocations);
        Ok(())
    }

    /// Charges `count` back subjects to `semester`. A student who had paid
    /// everything owes money again afterwards.
    pub fn add_back_subject_fees(&mut self, semester: u32, count: usize, unit_fee: f64) -> Result<f64> {
        let delta = surcharge(count, unit_fee)?;
        let sem = self.semester_for(semester)?;
        if delta == 0.0 {
            return Ok(0.0);
        }
        sem.back_subject_fees += delta;
        sem.total_amount += delta;
        self.total_course_fee += delta;
        self.recompute();
        Ok(delta)
    }

    pub fn remove_back_subject_fees(
        &mut self,
        semester: u32,
        count: usize,
        unit_fee: f64,
    ) -> Result<f64> {
        let delta = surcharge(count, unit_fee)?;
        let sem = self.semester_for(semester)?;
        if delta == 0.0 {
            return Ok(0.0);
        }
        if sem.back_subject_fees + MONEY_EPSILON < delta {
            return Err(LedgerError::validation(
                "semester",
                format!(
                    "semester {semester} only carries {} of back-subject fees, cannot remove {delta}",
                    sem.back_subject_fees
                ),
            ));
        }
        sem.back_subject_fees -= delta;
        sem.total_amount -= delta;
        self.total_course_fee -= delta;
        self.recompute();
        Ok(delta)
    }

    /// Administrative override of the course fee. Payments and back-subject
    /// charges are kept; only the base part of each semester is re-spread.
    /// Returns false when `new_total` equals the current total.
    pub fn change_course_fee(&mut self, new_total: f64) -> Result<bool> {
        require_finite(new_total, "total_course_fee")?;
        if new_total <= 0.0 {
            return Err(LedgerError::validation(
                "total_course_fee",
                "course fee must be greater than zero",
            ));
        }
        if (new_total - self.total_course_fee).abs() < MONEY_EPSILON {
            return Ok(false);
        }

        let back_total = self.back_subject_fee_total();
        if new_total + MONEY_EPSILON < back_total {
            return Err(LedgerError::validation(
                "total_course_fee",
                format!(
                    "course fee {new_total} is below the {back_total} of back-subject fees already charged"
                ),
            ));
        }
        let installment_amount = installment_for(new_total, self.number_of_installments);
        if installment_amount > new_total + MONEY_EPSILON {
            return Err(LedgerError::validation(
                "installment_amount",
                format!("installment amount {installment_amount} exceeds total course fee {new_total}"),
            ));
        }

        let weights: Vec<f64> = self
            .semester_fees
            .iter()
            .map(|s| (s.total_amount - s.back_subject_fees).max(0.0))
            .collect();
        let shares = distribute(new_total - back_total, &weights);
        for (sem, base) in self.semester_fees.iter_mut().zip(shares) {
            sem.total_amount = base + sem.back_subject_fees;
        }

        self.total_course_fee = new_total;
        self.recompute();
        Ok(true)
    }

    pub fn back_subject_fee_total(&self) -> f64 {
        self.semester_fees.iter().map(|s| s.back_subject_fees).sum()
    }

    /// Remaining amount as shown to people: overpayment reads as zero.
    pub fn outstanding(&self) -> f64 {
        self.remaining_amount.max(0.0)
    }

    pub fn fee_status(&self) -> FeeStatus {
        if self.remaining_amount <= MONEY_EPSILON {
            FeeStatus::Paid
        } else if self.total_paid > MONEY_EPSILON {
            FeeStatus::Partial
        } else {
            FeeStatus::Pending
        }
    }

    /// Checks the ledger invariants: remaining equals total minus paid, the
    /// semester slices add up to the total, and the installment amount is
    /// the ceiling of the total over the installment count.
    pub fn is_consistent(&self) -> bool {
        let close = |a: f64, b: f64| (a - b).abs() < MONEY_EPSILON;
        let remaining_ok = close(self.remaining_amount, self.total_course_fee - self.total_paid);
        let installment_ok = close(
            self.installment_amount,
            installment_for(self.total_course_fee, self.number_of_installments),
        );
        let semesters_ok = self.semester_fees.is_empty()
            || close(
                self.semester_fees.iter().map(|s| s.total_amount).sum(),
                self.total_course_fee,
            );
        let slices_ok = self
            .semester_fees
            .iter()
            .all(|s| close(s.remaining_amount, s.total_amount - s.paid_amount));
        remaining_ok && installment_ok && semesters_ok && slices_ok
    }

    fn credit(&mut self, net: f64, allocations: &[SemesterAllocation]) {
        self.total_paid += net;
        for allocation in allocations {
            if let Some(sem) = self.semester_mut(allocation.semester_number) {
                sem.paid_amount += allocation.amount;
            }
        }
        self.recompute();
    }

    fn plan_unwind(&self, net: f64) -> Vec<SemesterAllocation> {
        let allocated: f64 = self.semester_fees.iter().map(|s| s.paid_amount).sum();
        let unallocated = (self.total_paid - allocated).clamp(0.0, net);
        let mut left = net - unallocated;
        let mut allocations = Vec::new();
        for sem in self.semester_fees.iter().rev() {
            if left <= MONEY_EPSILON {
                break;
            }
            let take = sem.paid_amount.max(0.0).min(left);
            if take > 0.0 {
                allocations.push(SemesterAllocation {
                    semester_number: sem.semester_number,
                    amount: take,
                });
                left -= take;
            }
        }
        allocations
    }

    fn semester_mut(&mut self, number: u32) -> Option<&mut SemesterFee> {
        self.semester_fees
            .iter_mut()
            .find(|s| s.semester_number == number)
    }

    fn semester_for(&mut self, number: u32) -> Result<&mut SemesterFee> {
        self.semester_mut(number).ok_or_else(|| {
            LedgerError::validation(
                "semester",
                format!("semester {number} is not part of this fee structure"),
            )
        })
    }

    /// Snaps every stored figure to whole paise before deriving the
    /// remaining amounts, so add/remove and apply/reverse cancel exactly.
    fn recompute(&mut self) {
        self.total_course_fee = round2(self.total_course_fee);
        self.total_paid = round2(self.total_paid);
        self.remaining_amount = round2(self.total_course_fee - self.total_paid);
        self.installment_amount = installment_for(self.total_course_fee, self.number_of_installments);
        for sem in &mut self.semester_fees {
            sem.total_amount = round2(sem.total_amount);
            sem.paid_amount = round2(sem.paid_amount);
            sem.back_subject_fees = round2(sem.back_subject_fees);
            sem.remaining_amount = round2(sem.total_amount - sem.paid_amount);
        }
    }
}

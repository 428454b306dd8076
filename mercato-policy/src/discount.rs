use chrono::{DateTime, Utc};
use mercato_catalog::{subtotal, ProductLines};
use mercato_core::{MarketError, MarketResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::arena::RuleArena;
use crate::purchase::{PurchasePolicy, RuleView};
use crate::target::Target;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompositeKind {
    /// Sum of eligible children
    Add,
    /// Best eligible child
    Max,
    /// One eligible child, chosen by the decision rule
    Xor,
    /// All children must be eligible
    And,
    /// Any eligible child unlocks all children
    Or,
}

/// How a XOR discount picks among its eligible children.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionRule {
    #[default]
    First,
    Max,
    Min,
}

/// Half-open validity period `[starts_at, ends_at)`; an open end is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiscountWindow {
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

impl DiscountWindow {
    pub fn new(starts_at: Option<DateTime<Utc>>, ends_at: Option<DateTime<Utc>>) -> Self {
        Self { starts_at, ends_at }
    }

    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.starts_at.map_or(true, |start| now >= start)
            && self.ends_at.map_or(true, |end| now < end)
    }

    pub fn validate(&self) -> MarketResult<()> {
        if let (Some(start), Some(end)) = (self.starts_at, self.ends_at) {
            if start >= end {
                return Err(MarketError::validation(
                    "Discount window must end after it starts",
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscountSpec {
    Simple {
        percentage: f64,
        target: Target,
        window: Option<DiscountWindow>,
    },
    Complex {
        kind: CompositeKind,
        #[serde(default)]
        decision_rule: DecisionRule,
    },
}

impl DiscountSpec {
    pub fn simple(percentage: f64, target: Target) -> Self {
        DiscountSpec::Simple {
            percentage,
            target,
            window: None,
        }
    }

    pub fn complex(kind: CompositeKind) -> Self {
        DiscountSpec::Complex {
            kind,
            decision_rule: DecisionRule::default(),
        }
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, DiscountSpec::Complex { .. })
    }

    pub fn validate(&self) -> MarketResult<()> {
        if let DiscountSpec::Simple {
            percentage, window, ..
        } = self
        {
            validate_percentage(*percentage)?;
            if let Some(window) = window {
                window.validate()?;
            }
        }
        Ok(())
    }
}

fn validate_percentage(percentage: f64) -> MarketResult<()> {
    if !(0.0..=100.0).contains(&percentage) {
        return Err(MarketError::validation(format!(
            "Discount percentage must be between 0 and 100, got {}",
            percentage
        )));
    }
    Ok(())
}

/// A node of the discount tree together with the conditions it is subject to.
#[derive(Debug, Clone)]
pub struct Discount {
    pub spec: DiscountSpec,
    pub conditions: PurchasePolicy,
}

impl Discount {
    fn new(spec: DiscountSpec) -> Self {
        Self {
            spec,
            conditions: PurchasePolicy::new(),
        }
    }

    pub fn is_conditional(&self) -> bool {
        !self.conditions.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscountView {
    pub id: Uuid,
    pub spec: DiscountSpec,
    pub conditions: RuleView,
    pub children: Vec<DiscountView>,
}

struct PricingInput<'a> {
    lines: &'a ProductLines,
    buyer_age: u32,
    now: DateTime<Utc>,
}

/// Discount tree of a store. The root is an ADD composite.
#[derive(Debug, Clone)]
pub struct DiscountPolicy {
    arena: RuleArena<Discount>,
}

impl Default for DiscountPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscountPolicy {
    pub fn new() -> Self {
        Self {
            arena: RuleArena::new(
                "Discount",
                Discount::new(DiscountSpec::complex(CompositeKind::Add)),
            ),
        }
    }

    pub fn root_id(&self) -> Uuid {
        self.arena.root()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn apply_discount(&self, lines: &ProductLines, buyer_age: u32) -> f64 {
        self.apply_discount_at(lines, buyer_age, Utc::now())
    }

    /// Total discount for `lines`, never negative and never above their subtotal.
    pub fn apply_discount_at(
        &self,
        lines: &ProductLines,
        buyer_age: u32,
        now: DateTime<Utc>,
    ) -> f64 {
        let input = PricingInput {
            lines,
            buyer_age,
            now,
        };
        let amount = self.amount(self.arena.root(), &input, true);
        if !amount.is_finite() {
            return 0.0;
        }
        amount.max(0.0).min(subtotal(lines).max(0.0))
    }

    /// Add a discount under `parent_id` (the root when `None`).
    ///
    /// A simple parent is replaced by a new composite of kind `combine` holding the old
    /// discount followed by the new one.
    pub fn add_discount(
        &mut self,
        spec: DiscountSpec,
        parent_id: Option<Uuid>,
        combine: Option<CompositeKind>,
    ) -> MarketResult<Uuid> {
        spec.validate()?;
        let parent_id = parent_id.unwrap_or_else(|| self.arena.root());

        if self.arena.value(parent_id)?.spec.is_complex() {
            return self.arena.insert_child(parent_id, Discount::new(spec));
        }
        let kind = combine.ok_or_else(|| {
            MarketError::validation(format!(
                "Discount {} is a simple discount; a composite kind is needed to combine with it",
                parent_id
            ))
        })?;
        let composite = self
            .arena
            .wrap(parent_id, Discount::new(DiscountSpec::complex(kind)))?;
        self.arena.insert_child(composite, Discount::new(spec))
    }

    pub fn remove_discount(&mut self, discount_id: Uuid) -> MarketResult<()> {
        self.arena.remove(discount_id).map(|_| ())
    }

    pub fn move_discount(&mut self, discount_id: Uuid, new_parent_id: Uuid) -> MarketResult<()> {
        if !self.arena.value(new_parent_id)?.spec.is_complex() {
            return Err(MarketError::validation(format!(
                "Discount {} is a simple discount and cannot hold other discounts",
                new_parent_id
            )));
        }
        self.arena.move_node(discount_id, new_parent_id)
    }

    /// `None` leaves a field unchanged. For the window, `Some(None)` removes it so the
    /// discount applies at any time.
    pub fn edit_simple_discount(
        &mut self,
        discount_id: Uuid,
        percentage: Option<f64>,
        target: Option<Target>,
        window: Option<Option<DiscountWindow>>,
    ) -> MarketResult<()> {
        if let Some(percentage) = percentage {
            validate_percentage(percentage)?;
        }
        if let Some(Some(window)) = &window {
            window.validate()?;
        }
        match &mut self.arena.value_mut(discount_id)?.spec {
            DiscountSpec::Simple {
                percentage: current_percentage,
                target: current_target,
                window: current_window,
            } => {
                if let Some(percentage) = percentage {
                    *current_percentage = percentage;
                }
                if let Some(target) = target {
                    *current_target = target;
                }
                if let Some(window) = window {
                    *current_window = window;
                }
                Ok(())
            }
            DiscountSpec::Complex { .. } => Err(MarketError::validation(format!(
                "Discount {} is not a simple discount",
                discount_id
            ))),
        }
    }

    pub fn edit_complex_discount(
        &mut self,
        discount_id: Uuid,
        kind: Option<CompositeKind>,
        decision_rule: Option<DecisionRule>,
    ) -> MarketResult<()> {
        match &mut self.arena.value_mut(discount_id)?.spec {
            DiscountSpec::Complex {
                kind: current_kind,
                decision_rule: current_rule,
            } => {
                if let Some(kind) = kind {
                    *current_kind = kind;
                }
                if let Some(rule) = decision_rule {
                    *current_rule = rule;
                }
                Ok(())
            }
            DiscountSpec::Simple { .. } => Err(MarketError::validation(format!(
                "Discount {} is not a complex discount",
                discount_id
            ))),
        }
    }

    pub fn discount(&self, discount_id: Uuid) -> MarketResult<&Discount> {
        self.arena.value(discount_id)
    }

    pub fn discounts(&self) -> DiscountView {
        self.view(self.arena.root())
    }

    pub fn conditions(&self, discount_id: Uuid) -> MarketResult<&PurchasePolicy> {
        Ok(&self.arena.value(discount_id)?.conditions)
    }

    pub fn conditions_mut(&mut self, discount_id: Uuid) -> MarketResult<&mut PurchasePolicy> {
        Ok(&mut self.arena.value_mut(discount_id)?.conditions)
    }

    fn is_eligible(&self, id: Uuid, input: &PricingInput) -> bool {
        let Ok(discount) = self.arena.value(id) else {
            return false;
        };
        if !discount.conditions.allows(input.lines, input.buyer_age) {
            return false;
        }
        match &discount.spec {
            DiscountSpec::Simple { window, .. } => {
                window.map_or(true, |window| window.contains(input.now))
            }
            DiscountSpec::Complex { kind, .. } => {
                let children = self.arena.children(id);
                match kind {
                    CompositeKind::And => {
                        !children.is_empty()
                            && children.iter().all(|child| self.is_eligible(*child, input))
                    }
                    _ => children.iter().any(|child| self.is_eligible(*child, input)),
                }
            }
        }
    }

    /// With `conditioned` unset the node's own eligibility is ignored.
    fn amount(&self, id: Uuid, input: &PricingInput, conditioned: bool) -> f64 {
        if conditioned && !self.is_eligible(id, input) {
            return 0.0;
        }
        let Ok(discount) = self.arena.value(id) else {
            return 0.0;
        };
        let children = self.arena.children(id);

        match &discount.spec {
            DiscountSpec::Simple {
                percentage,
                target,
                window,
            } => {
                if window.is_some_and(|window| !window.contains(input.now)) {
                    return 0.0;
                }
                percentage / 100.0 * target.total(input.lines)
            }
            DiscountSpec::Complex {
                kind,
                decision_rule,
            } => match kind {
                CompositeKind::Add | CompositeKind::And => children
                    .iter()
                    .map(|child| self.amount(*child, input, true))
                    .sum(),
                CompositeKind::Max => children
                    .iter()
                    .map(|child| self.amount(*child, input, true))
                    .fold(0.0, f64::max),
                CompositeKind::Or => children
                    .iter()
                    .map(|child| self.amount(*child, input, false))
                    .sum(),
                CompositeKind::Xor => {
                    let mut eligible = children
                        .iter()
                        .filter(|child| self.is_eligible(**child, input))
                        .map(|child| self.amount(*child, input, true));
                    let chosen = match decision_rule {
                        DecisionRule::First => eligible.next(),
                        DecisionRule::Max => eligible.reduce(f64::max),
                        DecisionRule::Min => eligible.reduce(f64::min),
                    };
                    chosen.unwrap_or(0.0)
                }
            },
        }
    }

    fn view(&self, id: Uuid) -> DiscountView {
        let (spec, conditions) = match self.arena.value(id) {
            Ok(discount) => (discount.spec.clone(), discount.conditions.rules()),
            Err(_) => (
                DiscountSpec::complex(CompositeKind::Add),
                PurchasePolicy::new().rules(),
            ),
        };
        DiscountView {
            id,
            spec,
            conditions,
            children: self
                .arena
                .children(id)
                .iter()
                .map(|child| self.view(*child))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::purchase::{Condition, PurchaseRule};
    use chrono::Duration;
    use mercato_catalog::{Product, StockLine};
    use mercato_core::ErrorKind;

    struct Basket {
        milk: Product,
        bread: Product,
        lines: ProductLines,
    }

    // milk 10 x 2, bread 5 x 4: subtotal 40
    fn basket() -> Basket {
        let milk = Product::new("Milk", "dairy", 10.0, vec![]).unwrap();
        let bread = Product::new("Bread", "bakery", 5.0, vec![]).unwrap();
        let mut lines = ProductLines::new();
        lines.insert(milk.id(), StockLine::new(milk.clone(), 2));
        lines.insert(bread.id(), StockLine::new(bread.clone(), 4));
        Basket { milk, bread, lines }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_empty_policy_gives_nothing() {
        let b = basket();
        let policy = DiscountPolicy::new();
        assert!(policy.is_empty());
        assert_eq!(policy.apply_discount(&b.lines, 30), 0.0);
    }

    #[test]
    fn test_simple_discounts_add_up() {
        let b = basket();
        let mut policy = DiscountPolicy::new();
        policy
            .add_discount(DiscountSpec::simple(10.0, Target::Store), None, None)
            .unwrap();
        policy
            .add_discount(
                DiscountSpec::simple(50.0, Target::Category("dairy".to_string())),
                None,
                None,
            )
            .unwrap();
        // 4 + 10
        assert!(close(policy.apply_discount(&b.lines, 30), 14.0));
    }

    #[test]
    fn test_discount_never_exceeds_subtotal() {
        let b = basket();
        let mut policy = DiscountPolicy::new();
        for _ in 0..3 {
            policy
                .add_discount(DiscountSpec::simple(60.0, Target::Store), None, None)
                .unwrap();
        }
        assert!(close(policy.apply_discount(&b.lines, 30), 40.0));
        assert_eq!(policy.apply_discount(&ProductLines::new(), 30), 0.0);
    }

    #[test]
    fn test_percentage_is_validated() {
        let mut policy = DiscountPolicy::new();
        let err = policy
            .add_discount(DiscountSpec::simple(120.0, Target::Store), None, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = policy
            .add_discount(DiscountSpec::simple(-1.0, Target::Store), None, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_window() {
        let b = basket();
        let now = Utc::now();
        let mut policy = DiscountPolicy::new();
        policy
            .add_discount(
                DiscountSpec::Simple {
                    percentage: 25.0,
                    target: Target::Store,
                    window: Some(DiscountWindow::new(Some(now), Some(now + Duration::days(1)))),
                },
                None,
                None,
            )
            .unwrap();

        assert!(close(policy.apply_discount_at(&b.lines, 30, now), 10.0));
        assert_eq!(policy.apply_discount_at(&b.lines, 30, now - Duration::hours(1)), 0.0);
        assert_eq!(policy.apply_discount_at(&b.lines, 30, now + Duration::days(1)), 0.0);

        let err = policy
            .add_discount(
                DiscountSpec::Simple {
                    percentage: 5.0,
                    target: Target::Store,
                    window: Some(DiscountWindow::new(Some(now), Some(now))),
                },
                None,
                None,
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_window_can_be_cleared() {
        let b = basket();
        let now = Utc::now();
        let mut policy = DiscountPolicy::new();
        let id = policy
            .add_discount(DiscountSpec::simple(25.0, Target::Store), None, None)
            .unwrap();
        let later = DiscountWindow::new(Some(now + Duration::days(1)), None);

        policy
            .edit_simple_discount(id, None, None, Some(Some(later)))
            .unwrap();
        assert_eq!(policy.apply_discount_at(&b.lines, 30, now), 0.0);

        // percentage edits keep the window
        policy.edit_simple_discount(id, Some(50.0), None, None).unwrap();
        assert_eq!(policy.apply_discount_at(&b.lines, 30, now), 0.0);

        policy.edit_simple_discount(id, None, None, Some(None)).unwrap();
        assert!(close(policy.apply_discount_at(&b.lines, 30, now), 20.0));
        assert!(matches!(
            policy.discount(id).unwrap().spec,
            DiscountSpec::Simple { window: None, .. }
        ));

        let backwards = DiscountWindow::new(Some(now), Some(now - Duration::hours(1)));
        let err = policy
            .edit_simple_discount(id, None, None, Some(Some(backwards)))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_conditional_discount() {
        let b = basket();
        let mut policy = DiscountPolicy::new();
        let id = policy
            .add_discount(
                DiscountSpec::simple(20.0, Target::Product(b.milk.id())),
                None,
                None,
            )
            .unwrap();
        policy
            .conditions_mut(id)
            .unwrap()
            .add_purchase_rule(
                PurchaseRule::Leaf(Condition::MinQuantity {
                    target: Target::Product(b.bread.id()),
                    min: 5,
                }),
                None,
                None,
            )
            .unwrap();
        assert!(policy.discount(id).unwrap().is_conditional());
        assert_eq!(policy.apply_discount(&b.lines, 30), 0.0);

        let mut more_bread = b.lines.clone();
        more_bread.insert(b.bread.id(), StockLine::new(b.bread.clone(), 5));
        assert!(close(policy.apply_discount(&more_bread, 30), 4.0));
    }

    #[test]
    fn test_max_and_xor_decision_rules() {
        let b = basket();
        let mut policy = DiscountPolicy::new();
        let group = policy
            .add_discount(DiscountSpec::complex(CompositeKind::Max), None, None)
            .unwrap();
        // 2.0 on the whole bag, 5.0 on dairy, 6.0 on bakery
        policy
            .add_discount(DiscountSpec::simple(5.0, Target::Store), Some(group), None)
            .unwrap();
        policy
            .add_discount(
                DiscountSpec::simple(25.0, Target::Category("dairy".to_string())),
                Some(group),
                None,
            )
            .unwrap();
        policy
            .add_discount(
                DiscountSpec::simple(30.0, Target::Category("bakery".to_string())),
                Some(group),
                None,
            )
            .unwrap();
        assert!(close(policy.apply_discount(&b.lines, 30), 6.0));

        policy
            .edit_complex_discount(group, Some(CompositeKind::Xor), None)
            .unwrap();
        assert!(close(policy.apply_discount(&b.lines, 30), 2.0));
        policy
            .edit_complex_discount(group, None, Some(DecisionRule::Min))
            .unwrap();
        assert!(close(policy.apply_discount(&b.lines, 30), 2.0));
        policy
            .edit_complex_discount(group, None, Some(DecisionRule::Max))
            .unwrap();
        assert!(close(policy.apply_discount(&b.lines, 30), 6.0));
    }

    #[test]
    fn test_and_or_composites() {
        let b = basket();
        let mut policy = DiscountPolicy::new();
        let group = policy
            .add_discount(DiscountSpec::complex(CompositeKind::And), None, None)
            .unwrap();
        policy
            .add_discount(DiscountSpec::simple(10.0, Target::Store), Some(group), None)
            .unwrap();
        let adults = policy
            .add_discount(
                DiscountSpec::simple(10.0, Target::Category("dairy".to_string())),
                Some(group),
                None,
            )
            .unwrap();
        policy
            .conditions_mut(adults)
            .unwrap()
            .add_purchase_rule(
                PurchaseRule::Leaf(Condition::MinimumAge {
                    category: None,
                    min_age: 18,
                }),
                None,
                None,
            )
            .unwrap();

        assert!(close(policy.apply_discount(&b.lines, 30), 6.0));
        assert_eq!(policy.apply_discount(&b.lines, 12), 0.0);

        // under OR the store-wide child unlocks the adults-only one too
        policy
            .edit_complex_discount(group, Some(CompositeKind::Or), None)
            .unwrap();
        assert!(close(policy.apply_discount(&b.lines, 12), 6.0));
    }

    #[test]
    fn test_simple_parent_is_wrapped() {
        let b = basket();
        let mut policy = DiscountPolicy::new();
        let first = policy
            .add_discount(DiscountSpec::simple(10.0, Target::Store), None, None)
            .unwrap();

        let err = policy
            .add_discount(DiscountSpec::simple(20.0, Target::Store), Some(first), None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let second = policy
            .add_discount(
                DiscountSpec::simple(20.0, Target::Store),
                Some(first),
                Some(CompositeKind::Max),
            )
            .unwrap();

        let view = policy.discounts();
        assert_eq!(view.children.len(), 1);
        let wrapper = &view.children[0];
        assert_eq!(wrapper.spec, DiscountSpec::complex(CompositeKind::Max));
        let ids: Vec<Uuid> = wrapper.children.iter().map(|child| child.id).collect();
        assert_eq!(ids, vec![first, second]);
        assert!(close(policy.apply_discount(&b.lines, 30), 8.0));
    }

    #[test]
    fn test_structural_edits() {
        let b = basket();
        let mut policy = DiscountPolicy::new();
        let max = policy
            .add_discount(DiscountSpec::complex(CompositeKind::Max), None, None)
            .unwrap();
        let inner = policy
            .add_discount(DiscountSpec::complex(CompositeKind::Add), Some(max), None)
            .unwrap();
        let simple = policy
            .add_discount(DiscountSpec::simple(10.0, Target::Store), None, None)
            .unwrap();

        assert_eq!(
            policy.move_discount(max, inner).unwrap_err().kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            policy.move_discount(max, simple).unwrap_err().kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            policy.remove_discount(policy.root_id()).unwrap_err().kind(),
            ErrorKind::Validation
        );

        policy.move_discount(simple, inner).unwrap();
        assert!(close(policy.apply_discount(&b.lines, 30), 4.0));

        let err = policy
            .edit_simple_discount(max, Some(5.0), None, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        policy
            .edit_simple_discount(simple, Some(50.0), None, None)
            .unwrap();
        assert!(close(policy.apply_discount(&b.lines, 30), 20.0));

        policy.remove_discount(max).unwrap();
        assert!(policy.is_empty());
        assert_eq!(
            policy.discount(simple).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_view_serializes() {
        let mut policy = DiscountPolicy::new();
        policy
            .add_discount(DiscountSpec::simple(10.0, Target::Store), None, None)
            .unwrap();
        let json = serde_json::to_value(policy.discounts()).unwrap();
        assert_eq!(json["spec"]["kind"], "ADD");
        assert_eq!(json["children"][0]["spec"]["type"], "simple");
        assert_eq!(json["children"][0]["spec"]["target"]["obj"], "store");
    }
}

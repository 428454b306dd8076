use mercato_catalog::{subtotal, ProductLines};
use mercato_core::{MarketError, MarketResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::arena::RuleArena;
use crate::target::Target;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Clause {
    And,
    Or,
    Xor,
}

/// Eligibility constraint checked against a proposed purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Buyer must be at least `min_age`, when the purchase touches `category` (or always)
    MinimumAge { category: Option<String>, min_age: u32 },
    MaxQuantity { target: Target, max: i32 },
    MinQuantity { target: Target, min: i32 },
    /// Buying `product_id` requires also buying `required_id`
    Requires { product_id: Uuid, required_id: Uuid },
    Excludes { product_id: Uuid, excluded_id: Uuid },
    TotalPrice { min: Option<f64>, max: Option<f64> },
}

impl Condition {
    pub fn validate(&self) -> MarketResult<()> {
        match self {
            Condition::MaxQuantity { max, .. } if *max < 0 => {
                Err(MarketError::validation("Maximum quantity must be non-negative"))
            }
            Condition::MinQuantity { min, .. } if *min < 0 => {
                Err(MarketError::validation("Minimum quantity must be non-negative"))
            }
            Condition::Requires { product_id, required_id } if product_id == required_id => {
                Err(MarketError::validation("A product cannot require itself"))
            }
            Condition::Excludes { product_id, excluded_id } if product_id == excluded_id => {
                Err(MarketError::validation("A product cannot exclude itself"))
            }
            Condition::TotalPrice { min, max } => match (min, max) {
                (Some(min), Some(max)) if min > max => {
                    Err(MarketError::validation("Minimum price exceeds maximum price"))
                }
                (Some(bound), _) | (_, Some(bound)) if *bound < 0.0 => {
                    Err(MarketError::validation("Price bounds must be non-negative"))
                }
                _ => Ok(()),
            },
            _ => Ok(()),
        }
    }

    /// `Err` carries the reason the purchase is not allowed.
    pub fn evaluate(&self, lines: &ProductLines, buyer_age: u32) -> Result<(), String> {
        match self {
            Condition::MinimumAge { category, min_age } => {
                let applies = match category {
                    Some(category) => Target::Category(category.clone()).quantity(lines) > 0,
                    None => true,
                };
                if applies && buyer_age < *min_age {
                    let scope = category
                        .as_ref()
                        .map(|c| format!(" to buy {}", c))
                        .unwrap_or_default();
                    return Err(format!("Buyer must be at least {}{}", min_age, scope));
                }
                Ok(())
            }
            Condition::MaxQuantity { target, max } => {
                let quantity = target.quantity(lines);
                if quantity > *max {
                    return Err(format!(
                        "At most {} units of {} may be bought, got {}",
                        max,
                        target.describe(),
                        quantity
                    ));
                }
                Ok(())
            }
            Condition::MinQuantity { target, min } => {
                let quantity = target.quantity(lines);
                if quantity < *min {
                    return Err(format!(
                        "At least {} units of {} must be bought, got {}",
                        min,
                        target.describe(),
                        quantity
                    ));
                }
                Ok(())
            }
            Condition::Requires { product_id, required_id } => {
                if lines.contains_key(product_id) && !lines.contains_key(required_id) {
                    return Err(format!(
                        "Product {} can only be bought together with {}",
                        product_id, required_id
                    ));
                }
                Ok(())
            }
            Condition::Excludes { product_id, excluded_id } => {
                if lines.contains_key(product_id) && lines.contains_key(excluded_id) {
                    return Err(format!(
                        "Products {} and {} cannot be bought together",
                        product_id, excluded_id
                    ));
                }
                Ok(())
            }
            Condition::TotalPrice { min, max } => {
                let total = subtotal(lines);
                if min.is_some_and(|min| total < min) || max.is_some_and(|max| total > max) {
                    return Err(format!("Bag total {:.2} is outside the allowed range", total));
                }
                Ok(())
            }
        }
    }
}

/// Node of a purchase policy tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PurchaseRule {
    Leaf(Condition),
    Composite(Clause),
}

/// Nested read-only view of a rule tree.
#[derive(Debug, Clone, Serialize)]
pub struct RuleView {
    pub id: Uuid,
    pub rule: PurchaseRule,
    pub children: Vec<RuleView>,
}

/// Approves or rejects purchases. The root is an AND composite, so an empty policy allows
/// everything.
#[derive(Debug, Clone)]
pub struct PurchasePolicy {
    arena: RuleArena<PurchaseRule>,
}

impl Default for PurchasePolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl PurchasePolicy {
    pub fn new() -> Self {
        Self {
            arena: RuleArena::new("Purchase rule", PurchaseRule::Composite(Clause::And)),
        }
    }

    pub fn root_id(&self) -> Uuid {
        self.arena.root()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Add a rule under `parent_id` (the root when `None`).
    ///
    /// When the parent is a leaf, `clause` is required: a new composite of that clause takes
    /// the leaf's place and holds both the leaf and the new rule.
    pub fn add_purchase_rule(
        &mut self,
        rule: PurchaseRule,
        parent_id: Option<Uuid>,
        clause: Option<Clause>,
    ) -> MarketResult<Uuid> {
        if let PurchaseRule::Leaf(condition) = &rule {
            condition.validate()?;
        }
        let parent_id = parent_id.unwrap_or_else(|| self.arena.root());

        match self.arena.value(parent_id)? {
            PurchaseRule::Composite(_) => self.arena.insert_child(parent_id, rule),
            PurchaseRule::Leaf(_) => {
                let clause = clause.ok_or_else(|| {
                    MarketError::validation(format!(
                        "Rule {} is a simple rule; a clause is needed to combine with it",
                        parent_id
                    ))
                })?;
                let composite = self.arena.wrap(parent_id, PurchaseRule::Composite(clause))?;
                self.arena.insert_child(composite, rule)
            }
        }
    }

    pub fn remove_purchase_rule(&mut self, rule_id: Uuid) -> MarketResult<()> {
        self.arena.remove(rule_id).map(|_| ())
    }

    /// Leaves take a new condition, composites a new clause.
    pub fn edit_purchase_rule(&mut self, rule_id: Uuid, rule: PurchaseRule) -> MarketResult<()> {
        let current = self.arena.value_mut(rule_id)?;
        match (&*current, &rule) {
            (PurchaseRule::Leaf(_), PurchaseRule::Leaf(condition)) => condition.validate()?,
            (PurchaseRule::Composite(_), PurchaseRule::Composite(_)) => {}
            _ => {
                return Err(MarketError::validation(format!(
                    "Rule {} cannot change between simple and composite",
                    rule_id
                )))
            }
        }
        *current = rule;
        Ok(())
    }

    pub fn move_purchase_rule(&mut self, rule_id: Uuid, new_parent_id: Uuid) -> MarketResult<()> {
        if let PurchaseRule::Leaf(_) = self.arena.value(new_parent_id)? {
            return Err(MarketError::validation(format!(
                "Rule {} is a simple rule and cannot hold other rules",
                new_parent_id
            )));
        }
        self.arena.move_node(rule_id, new_parent_id)
    }

    pub fn rule(&self, rule_id: Uuid) -> MarketResult<&PurchaseRule> {
        self.arena.value(rule_id)
    }

    pub fn rules(&self) -> RuleView {
        self.view(self.arena.root())
    }

    pub fn check_policy(&self, lines: &ProductLines, buyer_age: u32) -> MarketResult<()> {
        self.evaluate(self.arena.root(), lines, buyer_age)
            .map_err(MarketError::PolicyRejected)
    }

    /// Boolean form of [`PurchasePolicy::check_policy`]
    pub fn allows(&self, lines: &ProductLines, buyer_age: u32) -> bool {
        self.evaluate(self.arena.root(), lines, buyer_age).is_ok()
    }

    fn evaluate(&self, id: Uuid, lines: &ProductLines, buyer_age: u32) -> Result<(), String> {
        let clause = match self.arena.value(id) {
            Ok(PurchaseRule::Leaf(condition)) => return condition.evaluate(lines, buyer_age),
            Ok(PurchaseRule::Composite(clause)) => *clause,
            Err(err) => return Err(err.to_string()),
        };
        let mut results = self
            .arena
            .children(id)
            .iter()
            .map(|child| self.evaluate(*child, lines, buyer_age));

        match clause {
            Clause::And => results.try_for_each(|result| result),
            Clause::Or => {
                let mut reasons = Vec::new();
                for result in results {
                    match result {
                        Ok(()) => return Ok(()),
                        Err(reason) => reasons.push(reason),
                    }
                }
                if reasons.is_empty() {
                    return Err("No alternative of an OR rule was given".to_string());
                }
                Err(reasons.join(" or "))
            }
            Clause::Xor => {
                let mut passed = 0;
                let mut reasons = Vec::new();
                for result in results {
                    match result {
                        Ok(()) => passed += 1,
                        Err(reason) => reasons.push(reason),
                    }
                }
                match passed {
                    1 => Ok(()),
                    0 if reasons.is_empty() => {
                        Err("No alternative of a XOR rule was given".to_string())
                    }
                    0 => Err(format!("None of the exclusive rules hold: {}", reasons.join("; "))),
                    _ => Err(format!("{} exclusive rules hold at once", passed)),
                }
            }
        }
    }

    fn view(&self, id: Uuid) -> RuleView {
        RuleView {
            id,
            rule: self
                .arena
                .value(id)
                .cloned()
                .unwrap_or(PurchaseRule::Composite(Clause::And)),
            children: self
                .arena
                .children(id)
                .iter()
                .map(|child| self.view(*child))
                .collect(),
        }
    }
}

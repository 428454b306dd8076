pub mod arena;
pub mod discount;
pub mod purchase;
pub mod target;

pub use arena::{ArenaNode, RuleArena};
pub use discount::{
    CompositeKind, DecisionRule, Discount, DiscountPolicy, DiscountSpec, DiscountView,
    DiscountWindow,
};
pub use purchase::{Clause, Condition, PurchasePolicy, PurchaseRule, RuleView};
pub use target::Target;

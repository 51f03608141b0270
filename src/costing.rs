//! Unit-cost calculator: converts heterogeneous purchase/stocking/recipe
//! units into per-ingredient cost and dish-level profit figures.
//!
//! The calculator is pure; callers resolve recipe lines against inventory
//! before handing a [`Dish`] in. Two entry points share one per-line pass:
//! - [`cost_dish`] never fails; unit-family violations are folded into
//!   `missing_cost_data` with a reason message (batch-job behavior).
//! - [`cost_dish_strict`] surfaces unit-family violations as [`CostError`]
//!   (interactive endpoint behavior).

use crate::model::{Dish, RecipeLine, Unit, UnitFamily};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CostError {
    #[error("Incompatible units for {item}: cannot convert purchase unit ({purchase}) to stocking unit ({stocking})")]
    PurchaseUnitMismatch {
        item: String,
        purchase: Unit,
        stocking: Unit,
    },
    #[error("Incompatible recipe unit for {line}: stock is in {stocking}, but recipe asks for {recipe}")]
    RecipeUnitMismatch {
        line: String,
        stocking: Unit,
        recipe: Unit,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct LineCost {
    pub name: String,
    pub cost: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DishCost {
    pub menu_id: i64,
    pub name: String,
    pub price: f64,
    pub food_cost: f64,
    pub profit: f64,
    pub profit_margin: f64,
    pub missing_cost_data: bool,
    pub breakdown: Vec<LineCost>,
}

/// Per-line outcome, captured explicitly so one bad line never aborts the
/// others.
enum LineOutcome {
    Cost(f64),
    Missing(String),
    Incompatible(CostError),
}

fn line_cost(line: &RecipeLine) -> LineOutcome {
    let Some(item) = line.item.as_ref() else {
        return LineOutcome::Missing(format!("{} not found in inventory", line.name));
    };

    let stocking = item.unit;

    let price = match item.purchase_price {
        Some(p) if p >= 0.0 && p.is_finite() => p,
        _ => return LineOutcome::Missing(format!("Missing price for {}", item.name)),
    };
    let lot = match item.purchase_quantity {
        Some(q) if q > 0.0 && q.is_finite() => q,
        _ => return LineOutcome::Missing(format!("Missing price for {}", item.name)),
    };
    let Some(purchase) = item.purchase_unit else {
        return LineOutcome::Missing(format!("Missing purchase unit for {}", item.name));
    };

    // Mass and volume must never be crossed between purchase and stocking.
    let crossed = matches!(
        (purchase.family(), stocking.family()),
        (UnitFamily::Mass, UnitFamily::Volume) | (UnitFamily::Volume, UnitFamily::Mass)
    );
    if crossed {
        return LineOutcome::Incompatible(CostError::PurchaseUnitMismatch {
            item: item.name.clone(),
            purchase,
            stocking,
        });
    }

    let price_per_purchase_unit = price / lot;

    // Price per single stocking unit. When both sides are counted pieces
    // there is no conversion ratio at all.
    let price_per_stock_unit = if purchase == Unit::Count && stocking == Unit::Count {
        price_per_purchase_unit
    } else {
        let ratio = purchase.base_factor() / stocking.base_factor();
        if ratio == 0.0 || !ratio.is_finite() {
            return LineOutcome::Missing(format!("Bad unit conversion for {}", item.name));
        }
        price_per_purchase_unit / ratio
    };

    // The recipe's required unit must share the stocking unit's family.
    if line.unit.family() != stocking.family() {
        return LineOutcome::Incompatible(CostError::RecipeUnitMismatch {
            line: line.name.clone(),
            stocking,
            recipe: line.unit,
        });
    }

    let final_conversion = line.unit.base_factor() / stocking.base_factor();
    if final_conversion == 0.0 || !final_conversion.is_finite() {
        return LineOutcome::Missing(format!("Bad unit conversion for {}", item.name));
    }

    let cost = price_per_stock_unit * (line.quantity_required * final_conversion);
    if !cost.is_finite() {
        return LineOutcome::Missing(format!("Bad cost data for {}", item.name));
    }
    LineOutcome::Cost(cost)
}

fn finish(dish: &Dish, total: f64, missing: bool, breakdown: Vec<LineCost>) -> DishCost {
    let profit = dish.price - total;
    let profit_margin = if dish.price > 0.0 {
        profit / dish.price * 100.0
    } else {
        0.0
    };
    DishCost {
        menu_id: dish.id,
        name: dish.name.clone(),
        price: dish.price,
        food_cost: total,
        profit,
        profit_margin,
        missing_cost_data: missing,
        breakdown,
    }
}

/// Lenient costing: every line yields either a cost or a reason message, and
/// the dish-level `missing_cost_data` flag aggregates them.
pub fn cost_dish(dish: &Dish) -> DishCost {
    let mut total = 0.0;
    let mut missing = false;
    let mut breakdown = Vec::with_capacity(dish.recipe.len());

    for line in &dish.recipe {
        match line_cost(line) {
            LineOutcome::Cost(cost) => {
                total += cost;
                breakdown.push(LineCost {
                    name: line.name.clone(),
                    cost,
                    msg: None,
                });
            }
            LineOutcome::Missing(msg) => {
                missing = true;
                breakdown.push(LineCost {
                    name: line.name.clone(),
                    cost: 0.0,
                    msg: Some(msg),
                });
            }
            LineOutcome::Incompatible(err) => {
                missing = true;
                breakdown.push(LineCost {
                    name: line.name.clone(),
                    cost: 0.0,
                    msg: Some(err.to_string()),
                });
            }
        }
    }

    finish(dish, total, missing, breakdown)
}

/// Strict costing for interactive callers: a unit-family violation is an
/// error, not a silently unpriced line. Missing data still only sets the
/// flag.
pub fn cost_dish_strict(dish: &Dish) -> Result<DishCost, CostError> {
    let mut total = 0.0;
    let mut missing = false;
    let mut breakdown = Vec::with_capacity(dish.recipe.len());

    for line in &dish.recipe {
        match line_cost(line) {
            LineOutcome::Cost(cost) => {
                total += cost;
                breakdown.push(LineCost {
                    name: line.name.clone(),
                    cost,
                    msg: None,
                });
            }
            LineOutcome::Missing(msg) => {
                missing = true;
                breakdown.push(LineCost {
                    name: line.name.clone(),
                    cost: 0.0,
                    msg: Some(msg),
                });
            }
            LineOutcome::Incompatible(err) => return Err(err),
        }
    }

    Ok(finish(dish, total, missing, breakdown))
}

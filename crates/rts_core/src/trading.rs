//! Trade routes between an own Market and a neutral TradePost.

use tracing::trace;

use crate::buildings::{center, distance_to_footprint};
use crate::entities::{EntityId, TradeLeg};
use crate::kinds::UnitType;
use crate::math::{fixed_ratio, Fixed};
use crate::orders::Order;
use crate::state::Match;

/// Traders pay out within this distance of the target building.
pub const TRADE_ARRIVAL_DISTANCE: Fixed = fixed_ratio(35, 10);

/// Gold paid per leg for a route of length `distance`.
#[must_use]
pub fn trade_gold(distance: Fixed) -> Fixed {
    let quadratic = fixed_ratio(8, 1000);
    let linear = fixed_ratio(1, 10);
    quadratic * distance * distance + linear * distance
}

/// Send a trader along `leg` of its route and price the trip.
///
/// Does nothing unless both ends of the route still exist.
pub fn start_leg(m: &mut Match, trader: EntityId, leg: TradeLeg) {
    let content = m.content_arc();
    let Some((home, dest)) = m.unit(trader).and_then(|u| u.trade.as_ref()).and_then(|t| t.home.zip(t.dest)) else {
        return;
    };
    let (Some(home_b), Some(dest_b)) = (m.building(home), m.building(dest)) else {
        return;
    };
    let gold = trade_gold(center(&content, home_b).distance(center(&content, dest_b)));
    let target = match leg {
        TradeLeg::ToDest => dest,
        TradeLeg::ToHome => home,
    };
    let Some(unit) = m.unit_mut(trader) else {
        return;
    };
    if let Some(trade) = unit.trade.as_mut() {
        trade.leg = Some(leg);
        trade.next_gold = gold;
        trade.paused = false;
    }
    unit.order = Some(Order::Trade { building: target });
}

/// Trading phase: restart idle traders and pay out arrivals.
pub fn process_trading(m: &mut Match) {
    let content = m.content_arc();
    for i in 0..m.units.len() {
        let unit = &m.units[i];
        if unit.kind != UnitType::Trader {
            continue;
        }
        let Some(trade) = unit.trade else {
            continue;
        };
        if trade.paused {
            continue;
        }
        let Some((home, dest)) = trade.home.zip(trade.dest) else {
            continue;
        };
        let (Some(home_b), Some(dest_b)) = (m.building(home), m.building(dest)) else {
            continue;
        };
        if home_b.owner != Some(unit.owner) || dest_b.owner.is_some() {
            continue;
        }
        let id = unit.id;
        let owner = unit.owner;
        let position = unit.position;
        let order = unit.order;

        let target = match order {
            None => {
                let leg = if trade.leg == Some(TradeLeg::ToHome) {
                    TradeLeg::ToHome
                } else {
                    TradeLeg::ToDest
                };
                start_leg(m, id, leg);
                continue;
            }
            Some(Order::Trade { building }) => building,
            Some(_) => continue,
        };
        let Some(target_b) = m.building(target) else {
            m.units[i].order = None;
            continue;
        };
        if distance_to_footprint(&content, target_b, position) > TRADE_ARRIVAL_DISTANCE {
            continue;
        }

        if let Some(player) = m.player_mut(owner) {
            player.resources.gold += trade.next_gold;
        }
        trace!(trader = id, gold = %trade.next_gold, "trade leg paid");

        let next_leg = {
            let Some(state) = m.units[i].trade.as_mut() else {
                continue;
            };
            if state.leg == Some(TradeLeg::ToDest) {
                if let Some(pending) = state.pending_home.take() {
                    state.home = Some(pending);
                }
                TradeLeg::ToHome
            } else {
                if let Some(pending) = state.pending_dest.take() {
                    state.dest = Some(pending);
                }
                TradeLeg::ToDest
            }
        };
        start_leg(m, id, next_leg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::BuildingType;
    use crate::math::{fixed_int, Vec2Fixed};
    use crate::test_support::{create_test_match, place_building, place_unit};

    fn pos(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::new(fixed_int(x), fixed_int(y))
    }

    fn create_test_route(m: &mut Match) -> (EntityId, EntityId, EntityId) {
        let market = place_building(m, Some(0), BuildingType::Market, pos(40, 40));
        let post = place_building(m, None, BuildingType::TradePost, pos(70, 40));
        let trader = place_unit(m, 0, UnitType::Trader, pos(45, 42));
        let trade = m.unit_mut(trader).unwrap().trade.as_mut().unwrap();
        trade.home = Some(market);
        trade.dest = Some(post);
        (market, post, trader)
    }

    #[test]
    fn test_trade_gold_grows_with_distance() {
        assert_eq!(trade_gold(Fixed::ZERO), Fixed::ZERO);
        assert!(trade_gold(fixed_int(60)) > trade_gold(fixed_int(30)) * 2);
    }

    #[test]
    fn test_idle_trader_starts_towards_destination() {
        let mut m = create_test_match(2);
        let (_, post, trader) = create_test_route(&mut m);
        process_trading(&mut m);
        let unit = m.unit(trader).unwrap();
        assert_eq!(unit.order, Some(Order::Trade { building: post }));
        assert!(unit.trade.as_ref().unwrap().next_gold > Fixed::ZERO);
    }

    #[test]
    fn test_arrival_pays_and_turns_around() {
        let mut m = create_test_match(2);
        let (market, _, trader) = create_test_route(&mut m);
        start_leg(&mut m, trader, TradeLeg::ToDest);
        m.unit_mut(trader).unwrap().position = pos(69, 41);
        let gold_before = m.players[0].resources.gold;
        process_trading(&mut m);
        let unit = m.unit(trader).unwrap();
        assert!(m.players[0].resources.gold > gold_before);
        assert_eq!(unit.order, Some(Order::Trade { building: market }));
        assert_eq!(unit.trade.as_ref().unwrap().leg, Some(TradeLeg::ToHome));
    }

    #[test]
    fn test_paused_trader_does_nothing() {
        let mut m = create_test_match(2);
        let (_, _, trader) = create_test_route(&mut m);
        m.unit_mut(trader).unwrap().trade.as_mut().unwrap().paused = true;
        process_trading(&mut m);
        assert_eq!(m.unit(trader).unwrap().order, None);
    }
}

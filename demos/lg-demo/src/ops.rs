//! Operations of the demo shop: home page, product page, add-to-cart, and a
//! background notification poll.

use lg_core::OpIndex;
use lg_data::{Capabilities, ChannelKey, JsonFieldListener, Sequence, Slot, SubstringListener};
use lg_driver::{DriverError, DriverResult, Expect, OperationFailed, OperationLogic, StepContext, StepOutcome};
use lg_spec::BehaviorSpec;
use lg_transport::Request;
use serde_json::json;

// ── Channels ──────────────────────────────────────────────────────────────────

/// Product ids seen on any page, shared by every behavior of the user.
pub const PRODUCTS: ChannelKey<Sequence<String>> = ChannelKey::user("products");

/// The product the behavior last looked at.
pub const LAST_PRODUCT: ChannelKey<Slot<String>> = ChannelKey::behavior("last_product");

pub const CART_ID: ChannelKey<Slot<String>> = ChannelKey::user("cart_id");

// ── Factory ───────────────────────────────────────────────────────────────────

/// Build the logic for the operation named in `spec`.
pub fn create(spec: &BehaviorSpec, op: OpIndex) -> DriverResult<Box<dyn OperationLogic>> {
    let logic: Box<dyn OperationLogic> = match spec.operation_name(op) {
        "home" => Box::new(Home),
        "product" => Box::new(Product),
        "cart" => Box::new(AddToCart),
        "notifications" => Box::new(Notifications),
        other => {
            return Err(DriverError::Operation {
                spec:  spec.name().to_owned(),
                op:    other.to_owned(),
                cause: "the demo has no operation of this name".into(),
            });
        }
    };
    Ok(logic)
}

fn product_links() -> SubstringListener {
    SubstringListener::new(PRODUCTS, "href=\"/product/", '"').unique()
}

// ── Operations ────────────────────────────────────────────────────────────────

/// Landing page with its images, scripts and stylesheets.
struct Home;

impl OperationLogic for Home {
    fn capabilities(&self) -> Capabilities {
        Capabilities::none().contains(PRODUCTS)
    }

    fn execute(&mut self, step: u32, ctx: &mut StepContext<'_>) -> Result<StepOutcome, OperationFailed> {
        if step > 0 {
            return Ok(StepOutcome::Complete);
        }
        let expect = Expect::ok().recursive().abort_on([401, 403]).listen(product_links());
        ctx.send(Request::get("/"), expect);
        Ok(StepOutcome::Continue)
    }
}

/// A random product from those seen so far, or the home page when none is
/// known yet.
struct Product;

impl OperationLogic for Product {
    fn capabilities(&self) -> Capabilities {
        Capabilities::none().needs(PRODUCTS).contains(LAST_PRODUCT)
    }

    fn execute(&mut self, step: u32, ctx: &mut StepContext<'_>) -> Result<StepOutcome, OperationFailed> {
        if step > 0 {
            return Ok(StepOutcome::Complete);
        }
        let products = ctx.channel(&PRODUCTS)?.snapshot();
        let picked = ctx.rng().choose(&products).cloned();

        let uri = match picked {
            Some(id) => {
                ctx.output(&LAST_PRODUCT)?.set(id.clone());
                format!("/product/{id}")
            }
            None => "/".to_owned(),
        };
        let expect = Expect::ok().recursive().must_contain("<html").listen(product_links());
        ctx.send(Request::get(uri), expect);
        Ok(StepOutcome::Continue)
    }
}

/// POST the last viewed product to the cart API.
struct AddToCart;

impl OperationLogic for AddToCart {
    fn capabilities(&self) -> Capabilities {
        Capabilities::none().needs(LAST_PRODUCT).contains(CART_ID)
    }

    fn execute(&mut self, step: u32, ctx: &mut StepContext<'_>) -> Result<StepOutcome, OperationFailed> {
        if step > 0 {
            return Ok(StepOutcome::Complete);
        }
        let Some(product) = ctx.channel(&LAST_PRODUCT)?.get() else {
            return Err(OperationFailed::new("no product viewed before adding to cart"));
        };
        let mut request = Request::post_json("/api/cart", json!({ "product": product }));
        if let Some(cart) = ctx.channel(&CART_ID)?.get() {
            request = request.header("X-Cart", cart);
        }
        let expect = Expect::ok()
            .status([200, 201])
            .abort_on([401])
            .listen(JsonFieldListener::new(CART_ID, "cart.id"));
        ctx.send(request, expect);
        Ok(StepOutcome::Continue)
    }
}

/// Background poll run by a child behavior.
struct Notifications;

impl OperationLogic for Notifications {
    fn execute(&mut self, step: u32, ctx: &mut StepContext<'_>) -> Result<StepOutcome, OperationFailed> {
        if step > 0 {
            return Ok(StepOutcome::Complete);
        }
        ctx.send(Request::get("/api/notifications"), Expect::ok().status([200, 204]));
        Ok(StepOutcome::Continue)
    }
}
